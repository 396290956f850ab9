#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod container;
pub mod monitor;
pub mod status;

pub use self::{
    container::SpecBuilder,
    monitor::Monitor,
    status::{ContainerPhase, Terminated},
};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{
            Container, ContainerState, ContainerStateRunning, ContainerStateTerminated,
            ContainerStateWaiting, ContainerStatus, EnvVar, EphemeralContainer, Pod, PodSpec,
            PodStatus, SecurityContext, VolumeMount,
        },
    },
    apimachinery::pkg::apis::meta::v1::Status,
};
pub use kube::{
    api::{Api, AttachParams, ObjectMeta, PostParams, ResourceExt},
    error::ErrorResponse,
    runtime::watcher,
    Client, Error,
};

/// Identifies the pod an ephemeral container is added to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

// === impl PodRef ===

impl PodRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for PodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
