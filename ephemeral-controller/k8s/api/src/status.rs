use crate::{ContainerStateTerminated, ContainerStatus, Pod};
use std::fmt;

/// The state of a container as reported in a pod's status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContainerPhase {
    Waiting {
        reason: Option<String>,
        message: Option<String>,
    },
    Running,
    Terminated(Terminated),
}

/// Details of a terminated container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Terminated {
    pub exit_code: i32,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub signal: Option<i32>,
}

/// Finds the status of an ephemeral container. Other container kinds are not
/// considered.
pub fn ephemeral_container_status<'p>(pod: &'p Pod, name: &str) -> Option<&'p ContainerStatus> {
    pod.status
        .as_ref()?
        .ephemeral_container_statuses
        .as_ref()?
        .iter()
        .find(|status| status.name == name)
}

pub fn ephemeral_container_working_dir<'p>(pod: &'p Pod, name: &str) -> Option<&'p str> {
    pod.spec
        .as_ref()?
        .ephemeral_containers
        .as_ref()?
        .iter()
        .find(|c| c.name == name)?
        .working_dir
        .as_deref()
}

// === impl ContainerPhase ===

impl ContainerPhase {
    /// Returns `None` until the kubelet has reported any state.
    pub fn of(status: &ContainerStatus) -> Option<Self> {
        let state = status.state.as_ref()?;
        if let Some(terminated) = &state.terminated {
            return Some(Self::Terminated(terminated.into()));
        }
        if state.running.is_some() {
            return Some(Self::Running);
        }
        state.waiting.as_ref().map(|waiting| Self::Waiting {
            reason: waiting.reason.clone(),
            message: waiting.message.clone(),
        })
    }

    pub fn lookup(pod: &Pod, name: &str) -> Option<Self> {
        ephemeral_container_status(pod, name).and_then(Self::of)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

impl fmt::Display for ContainerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting { reason, message } => {
                write!(f, "waiting")?;
                if let Some(reason) = reason {
                    write!(f, " ({reason})")?;
                }
                if let Some(message) = message {
                    write!(f, ": {message}")?;
                }
                Ok(())
            }
            Self::Running => write!(f, "running"),
            Self::Terminated(t) => write!(f, "terminated ({t})"),
        }
    }
}

// === impl Terminated ===

impl From<&ContainerStateTerminated> for Terminated {
    fn from(state: &ContainerStateTerminated) -> Self {
        Self {
            exit_code: state.exit_code,
            reason: state.reason.clone(),
            message: state.message.clone(),
            signal: state.signal,
        }
    }
}

impl fmt::Display for Terminated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exitCode={}", self.exit_code)?;
        if let Some(reason) = &self.reason {
            write!(f, ", reason={reason}")?;
        }
        if let Some(message) = &self.message {
            write!(f, ", message={message}")?;
        }
        if let Some(signal) = self.signal {
            write!(f, ", signal={signal}")?;
        }
        Ok(())
    }
}
