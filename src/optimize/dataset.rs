//! Newline-delimited JSON example datasets.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

/// One dataset example: input fields plus the expected `completion`.
pub type Record = Map<String, Value>;

/// Load a JSONL dataset. Blank lines and lines that are not UTF-8 encoded
/// JSON objects are skipped; a dataset with no usable lines is `EmptyDataset`.
pub async fn load_dataset(path: &Path) -> Result<Vec<Record>> {
    let contents = match fs::read(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::DatasetNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(Error::io(path, e)),
    };

    let records = parse_records(&contents, path);
    if records.is_empty() {
        return Err(Error::EmptyDataset {
            path: path.to_path_buf(),
        });
    }
    debug!(path = %path.display(), count = records.len(), "Loaded dataset");
    Ok(records)
}

fn parse_records(contents: &[u8], path: &Path) -> Vec<Record> {
    contents
        .split(|byte| *byte == b'\n')
        .enumerate()
        .filter_map(|(index, raw)| {
            let line = match std::str::from_utf8(raw) {
                Ok(line) => line.trim(),
                Err(e) => {
                    warn!(path = %path.display(), line = index + 1, error = %e, "Skipping dataset line that is not valid UTF-8");
                    return None;
                }
            };
            if line.is_empty() {
                return None;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(record)) => Some(record),
                Ok(_) => {
                    warn!(path = %path.display(), line = index + 1, "Skipping dataset line that is not an object");
                    None
                }
                Err(e) => {
                    warn!(path = %path.display(), line = index + 1, error = %e, "Skipping malformed dataset line");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn skips_malformed_and_blank_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dataset.jsonl");
        std::fs::write(
            &path,
            "{\"input\": \"Hello\", \"completion\": \"Hi\"}\n\nnot json\n[1, 2]\n{\"input\": \"Bye\", \"completion\": \"Ciao\"}\n",
        )
        .unwrap();

        let records = load_dataset(&path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["completion"], "Ciao");
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_invalidate_the_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dataset.jsonl");
        let mut contents = b"{\"name\": \"Ann\", \"completion\": \"Hi Ann\"}\r\n".to_vec();
        contents.extend_from_slice(b"{\"name\": \"\xff\xfe\", \"completion\": \"x\"}\n");
        std::fs::write(&path, contents).unwrap();

        let records = load_dataset(&path).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "Ann");
    }

    #[tokio::test]
    async fn missing_file_is_dataset_not_found() {
        let temp = TempDir::new().unwrap();
        let err = load_dataset(&temp.path().join("nope.jsonl")).await.unwrap_err();
        assert!(matches!(err, Error::DatasetNotFound { .. }));
    }

    #[tokio::test]
    async fn only_garbage_is_empty_dataset() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dataset.jsonl");
        std::fs::write(&path, "garbage\n{oops\n").unwrap();
        assert!(matches!(
            load_dataset(&path).await,
            Err(Error::EmptyDataset { .. })
        ));
    }
}
