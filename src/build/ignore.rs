//! Build context ignore rules

use crate::error::{DevcycleError, DevcycleResult};
use std::path::{Component, Path, PathBuf};

/// Ignore file read from the root of the build context
pub const IGNORE_FILE_NAME: &str = ".dockerignore";

/// Read the exclude patterns for hashing a build context
///
/// A missing ignore file means no excludes. When the Dockerfile lives inside
/// the context it is re-included along with the ignore file itself, so
/// editing either always changes the context hash.
pub fn read_ignore_patterns(context: &Path, dockerfile: &Path) -> DevcycleResult<Vec<String>> {
    let path = context.join(IGNORE_FILE_NAME);
    let mut patterns: Vec<String> = match std::fs::read_to_string(&path) {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(DevcycleError::io(
                format!("reading {}", path.display()),
                e,
            ))
        }
    };

    if let Some(rel) = relative_inside(dockerfile, context) {
        patterns.push(format!("!{}", rel));
        patterns.push(format!("!{}", IGNORE_FILE_NAME));
    }

    Ok(patterns)
}

/// `path` relative to `base` with forward slashes, if it lies below `base`
fn relative_inside(path: &Path, base: &Path) -> Option<String> {
    let path = absolute(path)?;
    let base = absolute(base)?;
    let rel = path.strip_prefix(&base).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

/// Lexically normalized absolute path (`.` and `..` resolved without touching the filesystem)
fn absolute(path: &Path) -> Option<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}
