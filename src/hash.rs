//! Content hashing for change detection
//!
//! Produces deterministic SHA256 hex digests of strings, single files and
//! whole directory trees. Directory hashes cover relative paths and file
//! contents (never timestamps), so re-running on an untouched tree yields
//! the same digest.

use crate::error::{DevcycleError, DevcycleResult};
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Hash a string
pub fn hash_string(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash the YAML serialization of a structure
pub fn hash_serialized<T: Serialize>(value: &T) -> DevcycleResult<String> {
    let serialized = serde_yaml::to_string(value)?;
    Ok(hash_string(&serialized))
}

/// Hash a single file's contents
pub fn hash_file(path: &Path) -> DevcycleResult<String> {
    let mut hasher = Sha256::new();
    feed_file(&mut hasher, path)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Hash a file or a directory tree
pub fn hash_path(path: &Path) -> DevcycleResult<String> {
    hash_path_excludes(path, &[])
}

/// Hash a file or a directory tree, skipping entries matched by
/// `.dockerignore`-style patterns (relative to `path`, `!` re-includes)
pub fn hash_path_excludes(path: &Path, excludes: &[String]) -> DevcycleResult<String> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DevcycleError::PathNotFound(path.to_path_buf())
        } else {
            DevcycleError::io(format!("reading metadata of {}", path.display()), e)
        }
    })?;

    if metadata.is_file() {
        return hash_file(path);
    }

    let matcher = ExcludeMatcher::new(excludes).map_err(|reason| DevcycleError::Hash {
        path: path.to_path_buf(),
        reason,
    })?;

    let mut hasher = Sha256::new();
    let mut hashed_files = 0usize;

    let walker = WalkDir::new(path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            // An excluded directory is pruned whole unless a re-include rule reaches into it
            match entry.path().strip_prefix(path) {
                Ok(rel) if !rel.as_os_str().is_empty() => {
                    let rel = normalize(rel);
                    !matcher.is_excluded(&rel) || matcher.may_reinclude_below(&rel)
                }
                _ => true,
            }
        });

    for entry in walker {
        let entry = entry.map_err(|e| DevcycleError::Hash {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let rel = match entry.path().strip_prefix(path) {
            Ok(rel) if !rel.as_os_str().is_empty() => normalize(rel),
            _ => continue,
        };

        if matcher.is_excluded(&rel) {
            continue;
        }

        if entry.file_type().is_dir() {
            hasher.update(format!("d;{};", rel).as_bytes());
        } else if entry.file_type().is_file() {
            hasher.update(format!("f;{};", rel).as_bytes());
            feed_file(&mut hasher, entry.path())?;
            hashed_files += 1;
        } else if entry.file_type().is_symlink() {
            let target = std::fs::read_link(entry.path()).map_err(|e| {
                DevcycleError::io(format!("reading link {}", entry.path().display()), e)
            })?;
            hasher.update(format!("l;{};{};", rel, target.display()).as_bytes());
        }
    }

    debug!("Hashed {} files below {}", hashed_files, path.display());
    Ok(hex::encode(hasher.finalize()))
}

fn feed_file(hasher: &mut Sha256, path: &Path) -> DevcycleResult<()> {
    let file = File::open(path)
        .map_err(|e| DevcycleError::io(format!("opening {}", path.display()), e))?;
    let mut reader = BufReader::new(file);
    let mut buf = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| DevcycleError::io(format!("reading {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(())
}

/// Relative path with forward slashes, independent of the host separator
fn normalize(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Ordered exclude rules; the last matching rule decides
struct ExcludeMatcher {
    rules: Vec<(Pattern, bool)>,
}

impl ExcludeMatcher {
    fn new(patterns: &[String]) -> Result<Self, String> {
        let mut rules = Vec::new();
        for raw in patterns {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (negated, body) = match trimmed.strip_prefix('!') {
                Some(rest) => (true, rest.trim()),
                None => (false, trimmed),
            };
            let body = body.trim_start_matches("./").trim_start_matches('/');
            let body = body.trim_end_matches('/');
            if body.is_empty() {
                continue;
            }
            let pattern =
                Pattern::new(body).map_err(|e| format!("invalid pattern '{}': {}", raw, e))?;
            rules.push((pattern, negated));
        }
        Ok(Self { rules })
    }

    /// Whether a `!` rule could match a path strictly below directory `dir`
    fn may_reinclude_below(&self, dir: &str) -> bool {
        let dir: Vec<&str> = dir.split('/').collect();
        self.rules
            .iter()
            .filter(|(_, negated)| *negated)
            .any(|(pattern, _)| {
                let segments: Vec<&str> = pattern.as_str().split('/').collect();
                if segments.contains(&"**") {
                    return Self::prefix_matches(&segments, &dir);
                }
                segments.len() > dir.len() && Self::prefix_matches(&segments, &dir)
            })
    }

    /// Segment-wise match of `dir` against the leading segments of a rule
    fn prefix_matches(segments: &[&str], dir: &[&str]) -> bool {
        for (segment, name) in segments.iter().zip(dir) {
            if *segment == "**" {
                return true;
            }
            match Pattern::new(segment) {
                Ok(p) if p.matches_with(name, MATCH_OPTIONS) => {}
                _ => return false,
            }
        }
        true
    }

    /// A path is excluded if it or one of its parent directories matches
    fn is_excluded(&self, rel: &str) -> bool {
        let mut excluded = false;
        for (pattern, negated) in &self.rules {
            if Self::matches(pattern, rel) {
                excluded = !negated;
            }
        }
        excluded
    }

    fn matches(pattern: &Pattern, rel: &str) -> bool {
        if pattern.matches_with(rel, MATCH_OPTIONS) {
            return true;
        }
        rel.match_indices('/')
            .any(|(idx, _)| pattern.matches_with(&rel[..idx], MATCH_OPTIONS))
    }
}
