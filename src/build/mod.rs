//! Image builds
//!
//! - [`BuildChangeDetector`]: decides whether an image needs a rebuild
//! - [`ImageEngine`]: probe, list and build through a container engine
//! - [`ImageBuilder`]: the pipeline tying both to the cache

mod builder;
mod detector;
mod engine;
mod ignore;

pub use builder::{BuildOptions, ImageBuilder};
pub use detector::BuildChangeDetector;
pub use engine::{DockerEngine, EngineProbe, ImageBuildRequest, ImageEngine};
pub use ignore::{read_ignore_patterns, IGNORE_FILE_NAME};

use std::collections::BTreeMap;

/// Tags produced by this run, keyed by image config name
pub type BuiltImages = BTreeMap<String, String>;
