use ephemeral_controller_k8s_api::{self as k8s, EphemeralContainer, Pod, PodRef};
use futures::stream::BoxStream;
use std::{sync::Arc, time::Duration};

/// The cluster operations needed to provision ephemeral containers.
#[async_trait::async_trait]
pub trait Cluster: Send + Sync {
    async fn get_pod(&self, pod: &PodRef) -> Result<Pod, ClusterError>;

    /// Appends `container` to the pod's ephemeral containers, based on the
    /// most recently read version of the pod.
    async fn add_ephemeral_container(
        &self,
        pod: &PodRef,
        container: &EphemeralContainer,
    ) -> Result<(), PatchError>;

    /// Streams versions of the pod as they change. Transient watch errors
    /// may be yielded; the stream recovers on its own.
    fn watch_pod(&self, pod: &PodRef) -> BoxStream<'static, Result<Pod, ClusterError>>;

    /// Runs `command` in the named container and waits for it to exit.
    async fn exec(
        &self,
        pod: &PodRef,
        container: &str,
        command: Vec<String>,
        io: ExecIo,
    ) -> Result<(), ClusterError>;
}

/// Where an executed command's output goes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExecIo {
    Discard,
    Inherit,
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("{message} ({reason})")]
    Api { reason: String, message: String },

    #[error("command failed: {0}")]
    Exec(String),

    #[error("watch failed: {0}")]
    Watch(String),

    #[error("pod watch ended")]
    WatchEnded,

    #[error(transparent)]
    Kube(#[from] k8s::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// The pod changed since it was read.
    #[error("{message} (Conflict)")]
    Conflict {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error(transparent)]
    Other(#[from] ClusterError),
}

#[async_trait::async_trait]
impl<C: Cluster + ?Sized> Cluster for Arc<C> {
    async fn get_pod(&self, pod: &PodRef) -> Result<Pod, ClusterError> {
        (**self).get_pod(pod).await
    }

    async fn add_ephemeral_container(
        &self,
        pod: &PodRef,
        container: &EphemeralContainer,
    ) -> Result<(), PatchError> {
        (**self).add_ephemeral_container(pod, container).await
    }

    fn watch_pod(&self, pod: &PodRef) -> BoxStream<'static, Result<Pod, ClusterError>> {
        (**self).watch_pod(pod)
    }

    async fn exec(
        &self,
        pod: &PodRef,
        container: &str,
        command: Vec<String>,
        io: ExecIo,
    ) -> Result<(), ClusterError> {
        (**self).exec(pod, container, command, io).await
    }
}

// === impl ClusterError ===

impl ClusterError {
    pub fn api(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

// === impl PatchError ===

impl PatchError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
