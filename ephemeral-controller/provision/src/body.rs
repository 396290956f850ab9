use ephemeral_controller_k8s_api::PodRef;
use std::{collections::BTreeMap, future::Future};

/// Binds the running ephemeral container's name into the body's environment.
pub const CONTAINER_ENV: &str = "POD_CONTAINER";

/// The work performed while an ephemeral container is active.
#[async_trait::async_trait]
pub trait Body: Send {
    async fn run(self, ctx: BodyContext) -> anyhow::Result<()>;
}

/// Describes the active container to a [`Body`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodyContext {
    pub pod: PodRef,
    pub container: String,
    pub env: BTreeMap<String, String>,
    pub shell: Option<String>,
    /// The working directory shared with the pod's primary container.
    pub working_dir: Option<String>,
}

#[async_trait::async_trait]
impl<F, Fut> Body for F
where
    F: FnOnce(BodyContext) -> Fut + Send,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn run(self, ctx: BodyContext) -> anyhow::Result<()> {
        (self)(ctx).await
    }
}
