#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod body;
mod client;
mod cluster;
mod console;
mod controller;
mod error;
mod identity;
mod metrics;
mod name;
mod retry;
pub mod stop;


pub use self::{
    body::{Body, BodyContext, CONTAINER_ENV},
    client::KubeCluster,
    cluster::{Cluster, ClusterError, ExecIo, PatchError},
    console::{Console, TracingConsole},
    controller::{ContainerInstance, Controller, Invocation, Outcome, Params},
    error::{Error, ErrorKind, Hint},
    identity::{IdentitySource, RunAs},
    metrics::Metrics,
    name::container_name,
};
