#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod evaluator;
pub mod image;
mod image_rule;
mod policy;
mod request;
pub mod rule;

pub use self::{
    evaluator::{evaluate, Rejected},
    image::ImageReference,
    image_rule::ContainerImageRule,
    policy::{Policy, PolicyError, Rules},
    request::{ContainerRequest, EnvVar},
    rule::{Action, Decision, Rule},
};
