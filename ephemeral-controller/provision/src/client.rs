use crate::{Cluster, ClusterError, ExecIo, PatchError};
use ephemeral_controller_k8s_api::{
    self as k8s, watcher, Api, AttachParams, EphemeralContainer, Pod, PodRef, PostParams, Status,
};
use futures::{prelude::*, stream::BoxStream};
use kube::runtime::WatchStreamExt;
use tokio::{
    io::{self, AsyncRead},
    task::JoinHandle,
};
use tracing::{debug, warn};

const SUBRESOURCE: &str = "ephemeralcontainers";

/// A [`Cluster`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeCluster {
    client: k8s::Client,
    field_manager: String,
}

// === impl KubeCluster ===

impl KubeCluster {
    pub fn new(client: k8s::Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api(&self, pod: &PodRef) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &pod.namespace)
    }
}

#[async_trait::async_trait]
impl Cluster for KubeCluster {
    async fn get_pod(&self, pod: &PodRef) -> Result<Pod, ClusterError> {
        self.api(pod).get(&pod.name).await.map_err(from_kube)
    }

    async fn add_ephemeral_container(
        &self,
        pod: &PodRef,
        container: &EphemeralContainer,
    ) -> Result<(), PatchError> {
        let api = self.api(pod);

        // The replacement carries the resource version that was read, so a
        // concurrent change to the pod is reported as a conflict.
        let mut current = api.get(&pod.name).await.map_err(from_kube)?;
        current
            .spec
            .get_or_insert_with(Default::default)
            .ephemeral_containers
            .get_or_insert_with(Vec::new)
            .push(container.clone());
        let data = serde_json::to_vec(&current).map_err(ClusterError::from)?;

        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        match api
            .replace_subresource(SUBRESOURCE, &pod.name, &params, data)
            .await
        {
            Ok(_) => {
                debug!(%pod, container = %container.name, "Added ephemeral container");
                Ok(())
            }
            Err(k8s::Error::Api(rsp)) if rsp.code == 409 || rsp.reason == "Conflict" => {
                Err(PatchError::Conflict {
                    message: rsp.message,
                    retry_after: None,
                })
            }
            Err(error) => Err(from_kube(error).into()),
        }
    }

    fn watch_pod(&self, pod: &PodRef) -> BoxStream<'static, Result<Pod, ClusterError>> {
        let config = watcher::Config::default().fields(&format!("metadata.name={}", pod.name));
        watcher(self.api(pod), config)
            .default_backoff()
            .applied_objects()
            .map_err(|error| ClusterError::Watch(error.to_string()))
            .boxed()
    }

    async fn exec(
        &self,
        pod: &PodRef,
        container: &str,
        command: Vec<String>,
        io: ExecIo,
    ) -> Result<(), ClusterError> {
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);
        let mut attached = self
            .api(pod)
            .exec(&pod.name, command, &params)
            .await
            .map_err(from_kube)?;

        let mut copies = Vec::with_capacity(2);
        if let Some(stdout) = attached.stdout() {
            copies.push(tokio::spawn(forward(stdout, io, false)));
        }
        if let Some(stderr) = attached.stderr() {
            copies.push(tokio::spawn(forward(stderr, io, true)));
        }

        let status = match attached.take_status() {
            Some(status) => status.await,
            None => None,
        };
        let bytes = join_output(container, copies).await;
        debug!(%container, bytes, "Exec output forwarded");
        attached
            .join()
            .await
            .map_err(|error| ClusterError::Exec(error.to_string()))?;

        match status {
            Some(Status {
                status: Some(status),
                message,
                ..
            }) if status != "Success" => Err(ClusterError::Exec(message.unwrap_or(status))),
            _ => Ok(()),
        }
    }
}

async fn forward<R>(mut output: R, mode: ExecIo, stderr: bool) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    match (mode, stderr) {
        (ExecIo::Discard, _) => io::copy(&mut output, &mut io::sink()).await,
        (ExecIo::Inherit, false) => io::copy(&mut output, &mut io::stdout()).await,
        (ExecIo::Inherit, true) => io::copy(&mut output, &mut io::stderr()).await,
    }
}

/// Waits for output forwarding to finish, returning the number of bytes
/// forwarded. Failed forwarders are logged.
async fn join_output(container: &str, copies: Vec<JoinHandle<io::Result<u64>>>) -> u64 {
    let mut bytes = 0;
    for copy in copies {
        match copy.await {
            Ok(Ok(n)) => bytes += n,
            Ok(Err(error)) => warn!(%container, %error, "Failed to forward exec output"),
            Err(error) => warn!(%container, %error, "Exec output task failed"),
        }
    }
    bytes
}

fn from_kube(error: k8s::Error) -> ClusterError {
    match error {
        k8s::Error::Api(rsp) => ClusterError::Api {
            reason: rsp.reason,
            message: rsp.message,
        },
        error => ClusterError::Kube(error),
    }
}
