//! Key list files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use vsum_models::TaskKey;

use crate::error::{PipelineError, PipelineResult};

/// File written by [`write_failed_keys`].
pub const FAILED_KEYS_FILE: &str = "failed_keys.txt";

/// Parse a key list: one key per line, blank lines and `#` comments skipped,
/// duplicates dropped keeping the first occurrence.
pub fn parse_key_list(text: &str) -> PipelineResult<Vec<TaskKey>> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let key = TaskKey::parse(line)
            .map_err(|e| PipelineError::invalid_input(format!("line {}: {}", line_no + 1, e)))?;
        if seen.insert(key.clone()) {
            keys.push(key);
        } else {
            debug!(task_key = %key, line = line_no + 1, "Skipping duplicate key");
        }
    }

    if keys.is_empty() {
        return Err(PipelineError::invalid_input("key list is empty"));
    }
    Ok(keys)
}

pub async fn read_key_file(path: impl AsRef<Path>) -> PipelineResult<Vec<TaskKey>> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path).await?;
    let keys = parse_key_list(&text)?;
    info!(path = %path.display(), keys = keys.len(), "Loaded key list");
    Ok(keys)
}

/// Write `keys` to `dir/failed_keys.txt`, one per line, and return the path.
pub async fn write_failed_keys(dir: impl AsRef<Path>, keys: &[TaskKey]) -> PipelineResult<PathBuf> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir).await?;

    let path = dir.join(FAILED_KEYS_FILE);
    let mut body = String::new();
    for key in keys {
        body.push_str(key.as_str());
        body.push('\n');
    }
    tokio::fs::write(&path, body).await?;

    info!(path = %path.display(), keys = keys.len(), "Wrote failed keys");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_duplicates() {
        let text = "# batch 1\nBV1\n\n  BV2  \nBV1\n#BV3\nBV4\n";
        let keys = parse_key_list(text).unwrap();
        let keys: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["BV1", "BV2", "BV4"]);
    }

    #[test]
    fn test_parse_empty_list_is_error() {
        assert!(parse_key_list("").is_err());
        assert!(parse_key_list("# only comments\n\n").is_err());
    }

    #[test]
    fn test_parse_reports_line_of_bad_key() {
        let err = parse_key_list("BV1\nBV 2\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
    }

    #[tokio::test]
    async fn test_failed_keys_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let keys = parse_key_list("BV7\nBV9").unwrap();

        let path = write_failed_keys(dir.path().join("out"), &keys).await.unwrap();
        assert_eq!(path.file_name().unwrap(), FAILED_KEYS_FILE);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "BV7\nBV9\n");

        let reread = read_key_file(&path).await.unwrap();
        assert_eq!(reread, keys);
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_key_file(dir.path().join("nope.txt")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
