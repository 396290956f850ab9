use std::fmt;

/// The user and group a container runs as.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RunAs {
    pub user: Option<i64>,
    pub group: Option<i64>,
}

/// Supplies a default identity for containers that do not request one.
#[async_trait::async_trait]
pub trait IdentitySource: Send + Sync {
    /// Returns `None` when the identity cannot be determined.
    async fn lookup(&self) -> Option<RunAs>;
}

// === impl RunAs ===

impl RunAs {
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.group.is_none()
    }
}

impl fmt::Display for RunAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.user {
            Some(user) => write!(f, "{user}")?,
            None => write!(f, "?")?,
        }
        match self.group {
            Some(group) => write!(f, ":{group}"),
            None => write!(f, ":?"),
        }
    }
}
