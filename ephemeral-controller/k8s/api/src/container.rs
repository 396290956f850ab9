use crate::{EnvVar, EphemeralContainer, Monitor, Pod, SecurityContext};
use ephemeral_controller_core::ContainerRequest;

/// Builds the ephemeral container added to a host pod.
#[derive(Clone, Debug)]
pub struct SpecBuilder {
    primary_container: String,
    monitor: Monitor,
}

// === impl SpecBuilder ===

impl SpecBuilder {
    /// Mounts and working directory are copied from the host pod's
    /// `primary_container`.
    pub fn new(primary_container: impl Into<String>, monitor: Monitor) -> Self {
        Self {
            primary_container: primary_container.into(),
            monitor,
        }
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn build(&self, name: &str, request: &ContainerRequest, pod: &Pod) -> EphemeralContainer {
        let env = request
            .env()
            .iter()
            .map(|var| EnvVar {
                name: var.name.clone(),
                value: Some(var.value.clone()),
                ..Default::default()
            })
            .collect::<Vec<_>>();

        let mut container = EphemeralContainer {
            name: name.to_string(),
            image: Some(request.image().to_string()),
            image_pull_policy: Some(
                if request.always_pull() {
                    "Always"
                } else {
                    "IfNotPresent"
                }
                .to_string(),
            ),
            target_container_name: request.target_container().map(Into::into),
            tty: Some(true),
            stdin: Some(true),
            env: Some(env).filter(|env| !env.is_empty()),
            ..Default::default()
        };

        let primary = pod
            .spec
            .iter()
            .flat_map(|spec| spec.containers.iter())
            .find(|c| c.name == self.primary_container);
        if let Some(primary) = primary {
            container.volume_mounts = primary.volume_mounts.clone();
            container.working_dir = primary.working_dir.clone();
        } else {
            tracing::debug!(primary = %self.primary_container, "Primary container not found in pod");
        }

        if request.run_as_user().is_some() || request.run_as_group().is_some() {
            container.security_context = Some(SecurityContext {
                run_as_user: request.run_as_user(),
                run_as_group: request.run_as_group(),
                ..Default::default()
            });
        }

        let wait = self.monitor.wait_command(name);
        match request.command() {
            // The image entrypoint is expected to accept an executable as its
            // first argument.
            None => container.args = Some(wait),
            // An empty command overrides the entrypoint.
            Some([]) => container.command = Some(wait),
            Some(command) => {
                container.command = Some(command.to_vec());
                container.args = Some(wait);
            }
        }

        container
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Container, PodSpec, VolumeMount};
    use pretty_assertions::assert_eq;

    fn pod() -> Pod {
        Pod {
            spec: Some(PodSpec {
                containers: vec![
                    Container {
                        name: "build".to_string(),
                        working_dir: Some("/build".to_string()),
                        ..Default::default()
                    },
                    Container {
                        name: "jnlp".to_string(),
                        working_dir: Some("/home/agent".to_string()),
                        volume_mounts: Some(vec![VolumeMount {
                            name: "workspace-volume".to_string(),
                            mount_path: "/home/agent".to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn builder() -> SpecBuilder {
        SpecBuilder::new("jnlp", Monitor::default())
    }

    #[test]
    fn no_command_uses_entrypoint() {
        let req = ContainerRequest::new("maven:3");
        let c = builder().build("ec-1", &req, &pod());
        assert_eq!(c.command, None);
        assert_eq!(c.args, Some(Monitor::default().wait_command("ec-1")));
    }

    #[test]
    fn empty_command_overrides_entrypoint() {
        let req = ContainerRequest::new("maven:3").with_command(Vec::<String>::new());
        let c = builder().build("ec-1", &req, &pod());
        assert_eq!(c.command, Some(Monitor::default().wait_command("ec-1")));
        assert_eq!(c.args, None);
    }

    #[test]
    fn explicit_command_gets_monitor_args() {
        let req = ContainerRequest::new("maven:3").with_command(["/entrypoint.sh", "--"]);
        let c = builder().build("ec-1", &req, &pod());
        assert_eq!(
            c.command,
            Some(vec!["/entrypoint.sh".to_string(), "--".to_string()])
        );
        assert_eq!(c.args, Some(Monitor::default().wait_command("ec-1")));
    }

    #[test]
    fn copies_primary_container_filesystem_view() {
        let c = builder().build("ec-1", &ContainerRequest::new("maven"), &pod());
        assert_eq!(c.working_dir.as_deref(), Some("/home/agent"));
        let mounts = c.volume_mounts.unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].mount_path, "/home/agent");
    }

    #[test]
    fn missing_primary_container_leaves_defaults() {
        let c = SpecBuilder::new("missing", Monitor::default()).build(
            "ec-1",
            &ContainerRequest::new("maven"),
            &pod(),
        );
        assert_eq!(c.working_dir, None);
        assert_eq!(c.volume_mounts, None);
    }

    #[test]
    fn copies_request_fields() {
        let req = ContainerRequest::new("maven:3")
            .with_env("A", "1")
            .with_env("B", "2")
            .with_target_container("build")
            .with_always_pull(false);
        let c = builder().build("ec-1", &req, &pod());
        assert_eq!(c.name, "ec-1");
        assert_eq!(c.image.as_deref(), Some("maven:3"));
        assert_eq!(c.image_pull_policy.as_deref(), Some("IfNotPresent"));
        assert_eq!(c.target_container_name.as_deref(), Some("build"));
        assert_eq!(c.tty, Some(true));
        assert_eq!(c.stdin, Some(true));
        let env = c
            .env
            .unwrap()
            .into_iter()
            .map(|v| (v.name, v.value.unwrap_or_default()))
            .collect::<Vec<_>>();
        assert_eq!(
            env,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn security_context_only_when_requested() {
        let c = builder().build("ec-1", &ContainerRequest::new("maven"), &pod());
        assert_eq!(c.security_context, None);

        let req = ContainerRequest::new("maven").with_run_as(Some(1000), None);
        let sc = builder().build("ec-1", &req, &pod()).security_context.unwrap();
        assert_eq!(sc.run_as_user, Some(1000));
        assert_eq!(sc.run_as_group, None);
    }
}
