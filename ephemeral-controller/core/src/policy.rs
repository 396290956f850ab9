use crate::{evaluate, ContainerRequest, Rejected, Rule};
use std::sync::Arc;

/// An immutable, ordered rule list.
pub type Rules = Arc<[Arc<dyn Rule>]>;

/// The rules that apply to a host workload.
///
/// Rules scoped to the workload's cloud are evaluated before process-wide
/// rules. A cloud without ephemeral container configuration does not permit
/// any request.
#[derive(Clone, Debug)]
pub struct Policy {
    cloud: String,
    cloud_rules: Option<Rules>,
    global_rules: Rules,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("Ephemeral containers not enabled on {0}")]
    NotEnabled(String),

    #[error(transparent)]
    Rejected(#[from] Rejected),
}

// === impl Policy ===

impl Policy {
    /// A cloud with ephemeral containers enabled and no rules.
    pub fn enabled(cloud: impl Into<String>) -> Self {
        Self {
            cloud: cloud.into(),
            cloud_rules: Some(Vec::new().into()),
            global_rules: Vec::new().into(),
        }
    }

    pub fn disabled(cloud: impl Into<String>) -> Self {
        Self {
            cloud: cloud.into(),
            cloud_rules: None,
            global_rules: Vec::new().into(),
        }
    }

    pub fn with_cloud_rules(mut self, rules: impl IntoIterator<Item = Arc<dyn Rule>>) -> Self {
        self.cloud_rules = Some(rules.into_iter().collect());
        self
    }

    pub fn with_global_rules(mut self, rules: impl IntoIterator<Item = Arc<dyn Rule>>) -> Self {
        self.global_rules = rules.into_iter().collect();
        self
    }

    pub fn cloud(&self) -> &str {
        &self.cloud
    }

    pub fn is_enabled(&self) -> bool {
        self.cloud_rules.is_some()
    }

    pub fn evaluate(&self, request: &ContainerRequest) -> Result<(), PolicyError> {
        let cloud_rules = self
            .cloud_rules
            .as_ref()
            .ok_or_else(|| PolicyError::NotEnabled(self.cloud.clone()))?;
        evaluate(request, cloud_rules.iter().chain(self.global_rules.iter()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, ContainerImageRule};
    use pretty_assertions::assert_eq;

    fn rule(names: &str, action: Action) -> Arc<dyn Rule> {
        Arc::new(ContainerImageRule::new(names, action).unwrap())
    }

    #[test]
    fn disabled_cloud_rejects_everything() {
        let policy = Policy::disabled("kubernetes");
        assert!(!policy.is_enabled());
        assert_eq!(
            policy.evaluate(&ContainerRequest::new("maven")),
            Err(PolicyError::NotEnabled("kubernetes".to_string()))
        );
        assert_eq!(
            PolicyError::NotEnabled("kubernetes".to_string()).to_string(),
            "Ephemeral containers not enabled on kubernetes"
        );
    }

    #[test]
    fn enabled_without_rules_allows() {
        let policy = Policy::enabled("kubernetes");
        assert_eq!(policy.evaluate(&ContainerRequest::new("maven")), Ok(()));
    }

    #[test]
    fn cloud_rules_run_before_global_rules() {
        let policy = Policy::enabled("kubernetes")
            .with_cloud_rules([rule("*/maven", Action::Reject)])
            .with_global_rules([rule("*/node", Action::Allow)]);
        let err = policy
            .evaluate(&ContainerRequest::new("maven"))
            .unwrap_err();
        match err {
            PolicyError::Rejected(Rejected { reason }) => {
                assert!(reason.contains("disallowed"), "{reason}")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn global_rules_still_apply_after_cloud_allow() {
        let policy = Policy::enabled("kubernetes")
            .with_cloud_rules([rule("*", Action::Allow)])
            .with_global_rules([rule("*/maven", Action::Reject)]);
        assert!(policy.evaluate(&ContainerRequest::new("maven")).is_err());
        assert_eq!(policy.evaluate(&ContainerRequest::new("node")), Ok(()));
    }
}
