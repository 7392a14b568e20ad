//! Chart values merging

use crate::error::{DevcycleError, DevcycleResult};
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Merge `overlay` into `base`; nested mappings merge, everything else replaces
pub fn merge_values(base: &mut Mapping, overlay: Mapping) {
    for (key, value) in overlay {
        match value {
            Value::Mapping(incoming) => {
                if let Some(Value::Mapping(existing)) = base.get_mut(&key) {
                    merge_values(existing, incoming);
                    continue;
                }
                base.insert(key, Value::Mapping(incoming));
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}

/// Read a YAML values file; an empty file is an empty mapping
pub fn read_values_file(path: &Path) -> DevcycleResult<Mapping> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| DevcycleError::io(format!("reading values file {}", path.display()), e))?;
    match serde_yaml::from_str::<Value>(&content)? {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(map) => Ok(map),
        _ => Err(DevcycleError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: "values file is not a mapping".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn yaml(s: &str) -> Mapping {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn nested_mappings_merge() {
        let mut base = yaml("image:\n  repository: nginx\n  tag: \"1.0\"\nreplicas: 1\n");
        merge_values(&mut base, yaml("image:\n  tag: \"2.0\"\nreplicas: 3\n"));
        assert_eq!(
            base,
            yaml("image:\n  repository: nginx\n  tag: \"2.0\"\nreplicas: 3\n")
        );
    }

    #[test]
    fn sequences_and_scalars_replace() {
        let mut base = yaml("args: [a, b]\nimage:\n  tag: x\n");
        merge_values(&mut base, yaml("args: [c]\nimage: plain\n"));
        assert_eq!(base, yaml("args: [c]\nimage: plain\n"));
    }

    #[test]
    fn read_empty_and_invalid_files() {
        let temp = TempDir::new().unwrap();
        let empty = temp.path().join("empty.yaml");
        std::fs::write(&empty, "").unwrap();
        assert!(read_values_file(&empty).unwrap().is_empty());

        let list = temp.path().join("list.yaml");
        std::fs::write(&list, "- a\n- b\n").unwrap();
        assert!(read_values_file(&list).is_err());

        assert!(read_values_file(temp.path()).is_err());
    }
}
