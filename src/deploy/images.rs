//! Image reference substitution
//!
//! Rewrites references to configured images inside chart values and
//! manifests so they point at the tag of the latest build.

use crate::build::BuiltImages;
use crate::cache::CacheStore;
use crate::config::ImageConfig;
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Repository part of an image reference, without tag or digest
///
/// `registry:5000/team/app:1.2@sha256:abc` becomes `registry:5000/team/app`.
pub fn strip_tag(reference: &str) -> &str {
    let reference = reference.split('@').next().unwrap_or(reference);
    let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[name_start..].rfind(':') {
        Some(i) => &reference[..name_start + i],
        None => reference,
    }
}

struct Target {
    image: String,
    tag: String,
    fresh: bool,
}

/// Replaces configured image references with `image:tag`
pub struct ImageReplacer {
    targets: Vec<Target>,
}

impl ImageReplacer {
    /// Tags come from this run's builds, falling back to the cached tag
    pub fn new(
        images: &BTreeMap<String, ImageConfig>,
        cache: &CacheStore,
        built_images: &BuiltImages,
    ) -> Self {
        let targets = images
            .iter()
            .filter_map(|(name, image)| {
                let built = built_images.get(name);
                let tag = match built {
                    Some(tag) if !tag.is_empty() => tag.clone(),
                    _ => cache.image_cache(name)?.tag.clone(),
                };
                if tag.is_empty() {
                    return None;
                }
                Some(Target {
                    image: image.image.clone(),
                    tag,
                    fresh: built.is_some(),
                })
            })
            .collect();
        Self { targets }
    }

    /// Rewrite matching string values inside `value`
    ///
    /// With `key` set only mapping entries under that key are considered.
    /// Returns whether a replaced reference belongs to an image built in
    /// this run, which makes the deployment stale.
    pub fn replace(&self, value: &mut Value, key: Option<&str>) -> bool {
        let mut redeploy = false;
        self.walk(value, None, key, &mut redeploy);
        redeploy
    }

    fn walk(&self, value: &mut Value, at: Option<&str>, key: Option<&str>, redeploy: &mut bool) {
        match value {
            Value::String(s) => {
                if key.is_some() && at != key {
                    return;
                }
                let repository = strip_tag(s);
                if let Some(target) = self.targets.iter().find(|t| t.image == repository) {
                    *s = format!("{}:{}", target.image, target.tag);
                    *redeploy |= target.fresh;
                }
            }
            Value::Mapping(map) => {
                for (k, v) in map.iter_mut() {
                    self.walk(v, k.as_str(), key, redeploy);
                }
            }
            Value::Sequence(seq) => {
                for v in seq.iter_mut() {
                    self.walk(v, None, key, redeploy);
                }
            }
            Value::Tagged(tagged) => self.walk(&mut tagged.value, at, key, redeploy),
            _ => {}
        }
    }
}
