/// Describes an ephemeral container to add to a running pod.
///
/// A request is built once, when the invocation starts, and is only read
/// afterwards. It is hashed to derive container names, so two identical
/// requests share a name prefix.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ContainerRequest {
    image: String,
    command: Option<Vec<String>>,
    env: Vec<EnvVar>,
    target_container: Option<String>,
    always_pull: bool,
    run_as_user: Option<i64>,
    run_as_group: Option<i64>,
    shell: Option<String>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

// === impl ContainerRequest ===

impl ContainerRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: None,
            env: Vec::new(),
            target_container: None,
            always_pull: true,
            run_as_user: None,
            run_as_group: None,
            shell: None,
        }
    }

    /// Sets an explicit command.
    ///
    /// An empty command overrides the image entrypoint with nothing, which is
    /// different from not setting a command at all.
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    /// Adds an environment variable. A variable with the same name replaces
    /// the earlier value in place.
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.env.iter_mut().find(|var| var.name == name) {
            Some(var) => var.value = value,
            None => self.env.push(EnvVar { name, value }),
        }
        self
    }

    pub fn with_target_container(mut self, container: impl Into<String>) -> Self {
        self.target_container = Some(container.into()).filter(|c: &String| !c.is_empty());
        self
    }

    pub fn with_always_pull(mut self, always_pull: bool) -> Self {
        self.always_pull = always_pull;
        self
    }

    pub fn with_run_as(mut self, user: Option<i64>, group: Option<i64>) -> Self {
        self.run_as_user = user;
        self.run_as_group = group;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into()).filter(|s: &String| !s.is_empty());
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// `None` keeps the image entrypoint; `Some(&[])` overrides it.
    pub fn command(&self) -> Option<&[String]> {
        self.command.as_deref()
    }

    pub fn env(&self) -> &[EnvVar] {
        &self.env
    }

    pub fn target_container(&self) -> Option<&str> {
        self.target_container.as_deref()
    }

    pub fn always_pull(&self) -> bool {
        self.always_pull
    }

    pub fn run_as_user(&self) -> Option<i64> {
        self.run_as_user
    }

    pub fn run_as_group(&self) -> Option<i64> {
        self.run_as_group
    }

    pub fn shell(&self) -> Option<&str> {
        self.shell.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn env_names_are_unique_and_ordered() {
        let req = ContainerRequest::new("maven")
            .with_env("A", "1")
            .with_env("B", "2")
            .with_env("A", "3");
        let names = req
            .env()
            .iter()
            .map(|v| (v.name.as_str(), v.value.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(names, vec![("A", "3"), ("B", "2")]);
    }

    #[test]
    fn command_absent_and_empty_differ() {
        let absent = ContainerRequest::new("maven");
        let empty = ContainerRequest::new("maven").with_command(Vec::<String>::new());
        assert_eq!(absent.command(), None);
        assert_eq!(empty.command(), Some(&[][..]));
        assert_ne!(absent, empty);
    }

    #[test]
    fn blank_optional_strings_are_unset() {
        let req = ContainerRequest::new("maven")
            .with_target_container("")
            .with_shell("");
        assert_eq!(req.target_container(), None);
        assert_eq!(req.shell(), None);
        assert!(req.always_pull());
    }
}
