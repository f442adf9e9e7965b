//! keel-lib: build orchestration engine
//!
//! A build definition declares named targets with dependencies, conditions,
//! required parameters and actions. This crate provides:
//! - `target`: target declarations and the registry modules contribute to
//! - `plan`: dependency resolution into an ordered execution plan
//! - `execute`: the engine that runs a plan and applies the failure policy
//! - `params`: parameter resolution with precedence, caching and secrets
//! - `host` and `output`: CI host detection and status reporting
//! - `definition`: declarative TOML build definitions with shell actions

pub mod consts;
pub mod definition;
pub mod execute;
pub mod host;
pub mod output;
pub mod params;
pub mod placeholder;
pub mod plan;
pub mod target;
pub mod tool;
#[cfg(test)]
mod util;
