//! Atomic file output.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use synthkit_shared::{Result, SynthError};

/// Write `contents` to `path` via a sibling temp file and a rename, creating
/// parent directories as needed. Readers never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| SynthError::io(dir, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SynthError::validation(format!("invalid output path: {}", path.display())))?;
    let temp = dir.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, contents).map_err(|e| SynthError::io(&temp, e))?;
    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(SynthError::io(path, e));
    }

    debug!(path = %path.display(), size = contents.len(), "wrote file");
    Ok(())
}

/// Pretty-print `data` as JSON and write it atomically.
pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| SynthError::validation(format!("JSON serialization failed: {e}")))?;
    write_atomic(path, &json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_dirs_and_leaves_no_temp() {
        let tmp = std::env::temp_dir().join("sk_test_write_atomic");
        let _ = std::fs::remove_dir_all(&tmp);

        let target = tmp.join("nested/out.jsonl");
        write_atomic(&target, "line\n").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "line\n");
        assert!(!tmp.join("nested/.out.jsonl.tmp").exists());

        write_atomic(&target, "replaced\n").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "replaced\n");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn write_json_is_pretty() {
        let tmp = std::env::temp_dir().join("sk_test_write_json");
        let _ = std::fs::remove_dir_all(&tmp);

        let target = tmp.join("data.json");
        write_json(&target, &serde_json::json!({ "a": 1 })).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "{\n  \"a\": 1\n}");

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
