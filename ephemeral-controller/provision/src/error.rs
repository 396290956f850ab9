use crate::{ClusterError, PatchError};
use ephemeral_controller_core::{PolicyError, Rejected};
use ephemeral_controller_k8s_api::{PodRef, Terminated};
use std::{fmt, time::Duration};

/// Why an invocation failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Ephemeral containers not enabled on {cloud}")]
    NotEnabled { cloud: String },

    #[error(transparent)]
    PolicyRejected(#[from] Rejected),

    #[error(
        "Ephemeral container {container} could not be added after {retries} retries. {source}{}",
        retry_limit(.exhausted)
    )]
    ProvisioningFailed {
        container: String,
        retries: u32,
        exhausted: bool,
        source: PatchError,
    },

    #[error(
        "Ephemeral container {container} on Pod {pod} failed to start: container terminated while waiting to start: {terminated}{}",
        fmt_hints(.hints)
    )]
    StartFailed {
        container: String,
        pod: PodRef,
        terminated: Terminated,
        retries: u32,
        hints: Vec<Hint>,
    },

    #[error(
        "Ephemeral container {container} on Pod {pod} failed to start after {} seconds: {}",
        secs(.timeout),
        last_status(.last)
    )]
    Timeout {
        container: String,
        pod: PodRef,
        timeout: Duration,
        last: Option<String>,
    },

    #[error("Ephemeral container {container} on Pod {pod}: {source}")]
    Cluster {
        container: String,
        pod: PodRef,
        source: ClusterError,
    },

    #[error("{0:#}")]
    Body(anyhow::Error),

    #[error("Ephemeral container stopped: {0}")]
    Stopped(String),
}

/// A coarse classification of [`Error`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotEnabled,
    PolicyRejected,
    ProvisioningFailed,
    StartFailed,
    Timeout,
    Cluster,
    Body,
    Stopped,
}

/// A likely explanation for a container that terminated before it started.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Hint {
    Resources,
    Architecture,
}

// === impl Error ===

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotEnabled { .. } => ErrorKind::NotEnabled,
            Self::PolicyRejected(_) => ErrorKind::PolicyRejected,
            Self::ProvisioningFailed { .. } => ErrorKind::ProvisioningFailed,
            Self::StartFailed { .. } => ErrorKind::StartFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cluster { .. } => ErrorKind::Cluster,
            Self::Body(_) => ErrorKind::Body,
            Self::Stopped(_) => ErrorKind::Stopped,
        }
    }
}

impl From<PolicyError> for Error {
    fn from(error: PolicyError) -> Self {
        match error {
            PolicyError::NotEnabled(cloud) => Self::NotEnabled { cloud },
            PolicyError::Rejected(rejected) => Self::PolicyRejected(rejected),
        }
    }
}

fn retry_limit(exhausted: &bool) -> &'static str {
    if *exhausted {
        ". Reached max retry limit."
    } else {
        ""
    }
}

fn secs(timeout: &Duration) -> u64 {
    timeout.as_secs()
}

fn last_status(last: &Option<String>) -> &str {
    last.as_deref().unwrap_or("no status available")
}

fn fmt_hints(hints: &[Hint]) -> String {
    if hints.is_empty() {
        return String::new();
    }
    let mut out =
        "\nBased on the container termination message there are several reasons that could have caused the failure:"
            .to_string();
    for hint in hints {
        out.push_str(&format!("\n{hint}"));
    }
    out
}

// === impl Hint ===

impl Hint {
    pub fn diagnose(terminated: &Terminated) -> Vec<Self> {
        let mut hints = Vec::new();
        let message = terminated.message.as_deref();
        if message.is_some_and(|m| m.contains("failed to create shim task: context")) {
            hints.push(Self::Resources);
        }
        if terminated.signal.is_none()
            && message.is_none()
            && terminated.reason.as_deref() == Some("Error")
        {
            hints.push(Self::Architecture);
        }
        hints
    }
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resources => write!(
                f,
                "  Resource Constraints:\n    - Insufficient memory or CPU resources\n    - Resource limits being hit during startup\n    - Node pressure or high system load"
            ),
            Self::Architecture => write!(
                f,
                "  Container Image:\n    - The image platform architecture is not compatible with host node. For example a linux/arm64 image running on a linux/amd64 kubernetes node."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn diagnoses_resource_starvation() {
        let terminated = Terminated {
            exit_code: 128,
            reason: Some("StartError".to_string()),
            message: Some(
                "failed to create containerd task: failed to create shim task: context deadline exceeded"
                    .to_string(),
            ),
            signal: None,
        };
        assert_eq!(Hint::diagnose(&terminated), vec![Hint::Resources]);
    }

    #[test]
    fn diagnoses_architecture_mismatch() {
        let terminated = Terminated {
            exit_code: 1,
            reason: Some("Error".to_string()),
            message: None,
            signal: None,
        };
        assert_eq!(Hint::diagnose(&terminated), vec![Hint::Architecture]);

        let signaled = Terminated {
            signal: Some(9),
            ..terminated
        };
        assert_eq!(Hint::diagnose(&signaled), vec![]);
    }

    #[test]
    fn timeout_message() {
        let err = Error::Timeout {
            container: "ec".to_string(),
            pod: PodRef::new("ns", "agent"),
            timeout: Duration::from_secs(100),
            last: None,
        };
        assert_eq!(
            err.to_string(),
            "Ephemeral container ec on Pod ns/agent failed to start after 100 seconds: no status available"
        );
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn provisioning_message_notes_retry_limit() {
        let err = Error::ProvisioningFailed {
            container: "ec".to_string(),
            retries: 10,
            exhausted: true,
            source: PatchError::conflict("the object has been modified"),
        };
        assert_eq!(
            err.to_string(),
            "Ephemeral container ec could not be added after 10 retries. the object has been modified (Conflict). Reached max retry limit."
        );
    }
}
