use ephemeral_controller_provision::{IdentitySource, RunAs};
use std::time::Duration;
use tokio::{process::Command, time};
use tracing::{debug, warn};

/// Reports the identity this process runs as, using `id`.
#[derive(Clone, Debug)]
pub struct ShellIdentity {
    timeout: Duration,
}

// === impl ShellIdentity ===

impl ShellIdentity {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn id(&self, flag: &str) -> Option<i64> {
        let mut id = Command::new("id");
        id.arg(flag).kill_on_drop(true);
        let output = match time::timeout(self.timeout, id.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => {
                warn!(%error, flag, "Failed to run id");
                return None;
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, flag, "Timed out running id");
                return None;
            }
        };
        if !output.status.success() {
            warn!(status = %output.status, flag, "id failed");
            return None;
        }
        parse_id(&output.stdout)
    }
}

#[async_trait::async_trait]
impl IdentitySource for ShellIdentity {
    async fn lookup(&self) -> Option<RunAs> {
        let run_as = RunAs {
            user: self.id("-u").await,
            group: self.id("-g").await,
        };
        debug!(%run_as, "Looked up process identity");
        Some(run_as).filter(|r| !r.is_empty())
    }
}

fn parse_id(stdout: &[u8]) -> Option<i64> {
    std::str::from_utf8(stdout).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_id_output() {
        assert_eq!(parse_id(b"1000\n"), Some(1000));
        assert_eq!(parse_id(b"  0 "), Some(0));
        assert_eq!(parse_id(b"jenkins\n"), None);
        assert_eq!(parse_id(b""), None);
    }
}
