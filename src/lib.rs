//! devcycle - incremental build and deploy cycles on Kubernetes
//!
//! Builds container images only when their inputs changed and redeploys
//! helm charts or kubectl manifests only when their configuration, values
//! or images changed.

pub mod build;
pub mod cache;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod deploy;
pub mod error;
pub mod exec;
pub mod hash;
pub mod ui;

#[cfg(test)]
mod testing;

pub use error::{DevcycleError, DevcycleResult};
