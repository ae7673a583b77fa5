//! Spec file loading and import merging.
//!
//! A spec may name other spec files under `imports`; paths resolve relative
//! to the importing file. Imported documents are deep-merged in listed
//! order, and the importing file wins on conflicts. Circular imports are
//! rejected.

use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::SpecError;
use crate::spec::SpecDocument;

/// Loads a spec file, resolves its import graph, and deserializes the
/// merged document.
pub fn load_spec(path: impl AsRef<Path>) -> Result<SpecDocument, SpecError> {
    let path = path.as_ref();
    let mut visiting = Vec::new();
    let merged = load_merged(path, &mut visiting)?;
    serde_yaml::from_value(merged).map_err(|e| SpecError::Parse(path.to_path_buf(), e))
}

fn load_merged(path: &Path, visiting: &mut Vec<PathBuf>) -> Result<Value, SpecError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| SpecError::Io(path.to_path_buf(), e))?;
    if visiting.contains(&canonical) {
        return Err(SpecError::CircularImport(canonical));
    }
    visiting.push(canonical.clone());

    let text =
        std::fs::read_to_string(path).map_err(|e| SpecError::Io(path.to_path_buf(), e))?;
    let document: Value =
        serde_yaml::from_str(&text).map_err(|e| SpecError::Parse(path.to_path_buf(), e))?;

    let imports = import_paths(&document);
    let base_dir = canonical.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut merged = Value::Mapping(Default::default());
    for import in &imports {
        debug!(import = %import, from = %path.display(), "resolving import");
        let child = load_merged(&base_dir.join(import), visiting)?;
        deep_merge(&mut merged, child);
    }
    // The importing document wins on conflicts.
    deep_merge(&mut merged, document);

    visiting.pop();
    Ok(merged)
}

fn import_paths(document: &Value) -> Vec<String> {
    let Some(imports) = document.get("imports").and_then(Value::as_sequence) else {
        return Vec::new();
    };
    imports
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

/// Merges `overlay` into `base`. Mappings merge key-by-key recursively;
/// everything else (sequences included) is replaced by the overlay.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.entry(key) {
                    serde_yaml::mapping::Entry::Occupied(mut entry) => {
                        deep_merge(entry.get_mut(), overlay_value)
                    }
                    serde_yaml::mapping::Entry::Vacant(entry) => {
                        entry.insert(overlay_value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "spec.yaml",
            r#"
version: "1.0"
simulation_settings:
  total_events: 3
"#,
        );

        let spec = load_spec(&path).unwrap();
        assert_eq!(spec.simulation_settings.total_events, Some(3));
    }

    #[test]
    fn test_imports_merge_with_main_winning() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "base.yaml",
            r#"
schemas:
  User:
    type: object
    properties:
      user_id:
        type: string
        generator: uuid_v4
simulation_settings:
  total_events: 100
  random_seed: 1
"#,
        );
        let main = write(
            dir.path(),
            "main.yaml",
            r#"
imports:
  - base.yaml
simulation_settings:
  total_events: 5
"#,
        );

        let spec = load_spec(&main).unwrap();
        // Overridden by the importing file
        assert_eq!(spec.simulation_settings.total_events, Some(5));
        // Inherited from the import
        assert_eq!(spec.simulation_settings.random_seed, Some(1));
        assert!(spec.schemas.contains_key("User"));
    }

    #[test]
    fn test_circular_import_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "imports:\n  - b.yaml\n");
        let b = write(dir.path(), "b.yaml", "imports:\n  - a.yaml\n");

        match load_spec(&b) {
            Err(SpecError::CircularImport(_)) => {}
            other => panic!("expected circular import error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        match load_spec("/definitely/not/here.yaml") {
            Err(SpecError::Io(..)) => {}
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn test_diamond_import_is_not_circular() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "common.yaml", "version: \"1.0\"\n");
        write(dir.path(), "left.yaml", "imports:\n  - common.yaml\n");
        write(dir.path(), "right.yaml", "imports:\n  - common.yaml\n");
        let main = write(
            dir.path(),
            "main.yaml",
            "imports:\n  - left.yaml\n  - right.yaml\n",
        );

        assert!(load_spec(&main).is_ok());
    }
}
