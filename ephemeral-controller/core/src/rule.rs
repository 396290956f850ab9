use crate::ContainerRequest;
use serde::Deserialize;
use std::{fmt, sync::Arc};

/// A predicate over a container request.
///
/// Rules are evaluated before anything is sent to the cluster. A rule that has
/// no opinion about a request returns `None`.
pub trait Rule: fmt::Debug + fmt::Display + Send + Sync {
    fn test(&self, request: &ContainerRequest) -> Option<Decision>;
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
pub enum Action {
    #[default]
    #[serde(alias = "allow", alias = "ALLOW")]
    Allow,
    #[serde(alias = "reject", alias = "REJECT")]
    Reject,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub reason: Option<String>,
}

// === impl Action ===

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("Allow"),
            Self::Reject => f.write_str("Reject"),
        }
    }
}

// === impl Decision ===

impl Decision {
    pub fn allow() -> Self {
        Self {
            action: Action::Allow,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Reject,
            reason: Some(reason.into()),
        }
    }

    pub fn is_reject(&self) -> bool {
        self.action == Action::Reject
    }
}

impl From<Action> for Decision {
    fn from(action: Action) -> Self {
        Self {
            action,
            reason: None,
        }
    }
}

// === impl Rule ===

impl<R: Rule + ?Sized> Rule for Box<R> {
    fn test(&self, request: &ContainerRequest) -> Option<Decision> {
        (**self).test(request)
    }
}

impl<R: Rule + ?Sized> Rule for Arc<R> {
    fn test(&self, request: &ContainerRequest) -> Option<Decision> {
        (**self).test(request)
    }
}
