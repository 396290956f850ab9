//! Keep-alive commands for ephemeral containers.
//!
//! Ephemeral containers cannot be removed from a pod, so each one runs a
//! monitor script that blocks until a sentinel file appears. Creating that
//! file from inside the container lets it exit.

use std::time::Duration;

const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Monitor {
    poll_interval: Duration,
}

// === impl Monitor ===

impl Default for Monitor {
    fn default() -> Self {
        Self {
            poll_interval: MIN_POLL_INTERVAL,
        }
    }
}

impl Monitor {
    /// The interval is rounded down to whole seconds and never less than one.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// The command that keeps the container alive until it is stopped.
    pub fn wait_command(&self, container: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), self.script(container)]
    }

    /// The command, executed inside the container, that makes the
    /// [`Monitor::wait_command`] exit.
    pub fn stop_command(container: &str) -> Vec<String> {
        vec!["touch".into(), sentinel_path(container)]
    }

    fn script(&self, container: &str) -> String {
        format!(
            "set -e; {{ while ! test -f '{}' ; do sleep {}; done }}",
            sentinel_path(container),
            self.poll_interval.as_secs()
        )
    }
}

pub fn sentinel_path(container: &str) -> String {
    format!("/tmp/{container}-ephemeral-step-is-done")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wait_command_polls_for_sentinel() {
        let cmd = Monitor::default().wait_command("ephemeral-abc");
        assert_eq!(
            cmd,
            vec![
                "sh",
                "-c",
                "set -e; { while ! test -f '/tmp/ephemeral-abc-ephemeral-step-is-done' ; do sleep 1; done }",
            ]
        );
    }

    #[test]
    fn stop_command_touches_sentinel() {
        assert_eq!(
            Monitor::stop_command("ephemeral-abc"),
            vec!["touch", "/tmp/ephemeral-abc-ephemeral-step-is-done"]
        );
    }

    #[test]
    fn poll_interval_is_at_least_one_second() {
        let cmd = Monitor::new(Duration::from_millis(10)).wait_command("c");
        assert!(cmd[2].contains("sleep 1;"), "{}", cmd[2]);

        let cmd = Monitor::new(Duration::from_secs(5)).wait_command("c");
        assert!(cmd[2].contains("sleep 5;"), "{}", cmd[2]);
    }
}
