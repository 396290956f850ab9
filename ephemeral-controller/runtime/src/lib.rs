#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod args;
mod body;
mod config;
mod console;
mod identity;

pub use self::{
    args::Args,
    body::ScriptBody,
    config::{CloudConfig, Config, ImageRuleConfig, RuleConfig, RuleSet},
    console::Stderr,
    identity::ShellIdentity,
};
