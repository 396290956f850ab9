use anyhow::{Context, Result};
use ephemeral_controller_core::{Action, ContainerImageRule, Policy, Rule};
use serde::Deserialize;
use std::{collections::BTreeMap, path::Path, sync::Arc};

/// Policy and environment configuration for ephemeral containers.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// When absent, ephemeral containers are not enabled.
    pub cloud: Option<CloudConfig>,
    #[serde(default)]
    pub global: RuleSet,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct CloudConfig {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleConfig {
    ContainerImage(ImageRuleConfig),
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ImageRuleConfig {
    pub names: String,
    pub action: Action,
}

// === impl Config ===

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("invalid ephemeral container configuration")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let yaml = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml(&yaml)
    }

    /// Builds the policy for `cloud`. A configured cloud takes its name from
    /// the configuration.
    pub fn policy(&self, cloud: &str) -> Result<Policy> {
        let global = build_rules(&self.global.rules)?;
        let policy = match &self.cloud {
            Some(c) => Policy::enabled(c.name.clone()).with_cloud_rules(build_rules(&c.rules)?),
            None => Policy::disabled(cloud),
        };
        Ok(policy.with_global_rules(global))
    }
}

fn build_rules(rules: &[RuleConfig]) -> Result<Vec<Arc<dyn Rule>>> {
    rules
        .iter()
        .map(|rule| match rule {
            RuleConfig::ContainerImage(ImageRuleConfig { names, action }) => {
                let rule = ContainerImageRule::new(names, *action)
                    .with_context(|| format!("invalid image patterns: {names:?}"))?;
                Ok(Arc::new(rule) as Arc<dyn Rule>)
            }
        })
        .collect()
}

// === impl ImageRuleConfig ===

impl Default for ImageRuleConfig {
    fn default() -> Self {
        Self {
            names: "*".to_string(),
            action: Action::Allow,
        }
    }
}
