//! Persistent cache of prior build and deploy work
//!
//! Records content hashes (and release revisions) of the inputs that went
//! into the last successful build of each image and the last successful
//! deployment of each deployment entry. A decision compares freshly computed
//! hashes against these records to find out whether prior work is still
//! valid.
//!
//! # Record Lifecycle
//!
//! | Event | Effect |
//! |-------|--------|
//! | First decision | Record created empty (never built / never deployed) |
//! | Every decision | Record read |
//! | Confirmed success | Record updated |
//! | Purge | Record removed |
//!
//! Records are never written before the external action they describe has
//! completed successfully.

pub mod store;

pub use store::{CacheStore, DeploymentCache, ImageCache, LastContext};
