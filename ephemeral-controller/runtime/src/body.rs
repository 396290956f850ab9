use anyhow::Context;
use ephemeral_controller_provision::{Body, BodyContext, Cluster, ExecIo};
use tracing::info;

const DEFAULT_SHELL: &str = "sh";

/// Runs a shell script inside the ephemeral container.
#[derive(Clone, Debug)]
pub struct ScriptBody<C> {
    cluster: C,
    script: String,
}

// === impl ScriptBody ===

impl<C> ScriptBody<C> {
    pub fn new(cluster: C, script: impl Into<String>) -> Self {
        Self {
            cluster,
            script: script.into(),
        }
    }

    /// The variables are exported with `env` so they are visible to the
    /// script whatever shell runs it.
    fn command(&self, ctx: &BodyContext) -> Vec<String> {
        let shell = ctx.shell.as_deref().unwrap_or(DEFAULT_SHELL);
        let script = match &ctx.working_dir {
            Some(dir) => format!("cd -- {} || exit\n{}", quote(dir), self.script),
            None => self.script.clone(),
        };
        let mut command = Vec::with_capacity(ctx.env.len() + 4);
        command.push("env".to_string());
        command.extend(ctx.env.iter().map(|(k, v)| format!("{k}={v}")));
        command.push(shell.to_string());
        command.push("-c".to_string());
        command.push(script);
        command
    }
}

/// Single-quotes `s` for a POSIX shell.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[async_trait::async_trait]
impl<C: Cluster> Body for ScriptBody<C> {
    async fn run(self, ctx: BodyContext) -> anyhow::Result<()> {
        let command = self.command(&ctx);
        info!(container = %ctx.container, "Running script");
        self.cluster
            .exec(&ctx.pod, &ctx.container, command, ExecIo::Inherit)
            .await
            .with_context(|| format!("script failed in ephemeral container {}", ctx.container))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_controller_k8s_api::PodRef;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn ctx(shell: Option<&str>, working_dir: Option<&str>) -> BodyContext {
        BodyContext {
            pod: PodRef::new("ci", "agent"),
            container: "ephemeral-1".to_string(),
            env: BTreeMap::from([
                ("POD_CONTAINER".to_string(), "ephemeral-1".to_string()),
                ("FOO".to_string(), "bar baz".to_string()),
            ]),
            shell: shell.map(Into::into),
            working_dir: working_dir.map(Into::into),
        }
    }

    #[test]
    fn exports_environment_to_default_shell() {
        let body = ScriptBody::new((), "mvn -v");
        assert_eq!(
            body.command(&ctx(None, None)),
            vec![
                "env",
                "FOO=bar baz",
                "POD_CONTAINER=ephemeral-1",
                "sh",
                "-c",
                "mvn -v"
            ]
        );
    }

    #[test]
    fn honors_shell() {
        let body = ScriptBody::new((), "echo $0");
        let command = body.command(&ctx(Some("bash"), None));
        assert_eq!(command[command.len() - 3..].to_vec(), vec!["bash", "-c", "echo $0"]);
    }

    #[test]
    fn runs_in_working_dir() {
        let body = ScriptBody::new((), "mvn -v");
        let command = body.command(&ctx(None, Some("/home/jenkins/agent")));
        assert_eq!(
            command.last().map(String::as_str),
            Some("cd -- '/home/jenkins/agent' || exit\nmvn -v")
        );

        let command = body.command(&ctx(None, Some("/tmp/it's")));
        assert_eq!(
            command.last().map(String::as_str),
            Some("cd -- '/tmp/it'\\''s' || exit\nmvn -v")
        );
    }
}
