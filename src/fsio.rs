//! Filesystem primitives shared by every store.
//!
//! All writes go through [`atomic_write`]: the content lands in a temp file
//! next to the target and is renamed over it, so readers see either the old
//! file or the complete new one.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// Name of the directory that marks a project root.
pub const MARKER_DIR: &str = ".promptkeep";

/// Create `path` and all missing parents. No-op if it already exists.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io(path, e))
}

/// Write `contents` to `path` via temp file + rename.
///
/// If anything fails before the rename the original file is untouched and
/// the temp file is removed.
pub async fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_dir(&dir).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::validation(format!("invalid file path '{}'", path.display())))?;
    let temp_path = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    if let Err(e) = write_and_sync(&temp_path, contents).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(Error::io(&temp_path, e));
    }

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(Error::io(path, e));
    }

    debug!(path = %path.display(), bytes = contents.len(), "Wrote file atomically");
    Ok(())
}

async fn write_and_sync(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Serialize `value` as pretty JSON and write it atomically.
pub async fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let contents =
        serde_json::to_string_pretty(value).map_err(|e| Error::Serialize(e.to_string()))?;
    atomic_write(path, &contents).await
}

/// Serialize `value` as YAML and write it atomically.
pub async fn atomic_write_yaml<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_yaml_ng::to_string(value).map_err(|e| Error::Serialize(e.to_string()))?;
    atomic_write(path, &contents).await
}

/// Read a whole text file. An absent file is [`Error::FileNotFound`].
pub async fn read_text(path: &Path) -> Result<String> {
    match fs::read_to_string(path).await {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Read and parse a JSON file. Absent => `FileNotFound`, unparseable => `Malformed`.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = read_text(path).await?;
    serde_json::from_str(&contents).map_err(|e| Error::malformed(path, e))
}

/// Read and parse a YAML file. An empty document yields `T::default()`.
pub async fn read_yaml<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let contents = read_text(path).await?;
    if contents.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml_ng::from_str(&contents).map_err(|e| Error::malformed(path, e))
}

/// Walk upward from `start` looking for a directory containing [`MARKER_DIR`].
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let not_found = || Error::ProjectNotFound {
        start: start.to_path_buf(),
    };
    let start_abs = start.canonicalize().map_err(|_| not_found())?;

    start_abs
        .ancestors()
        .find(|dir| dir.join(MARKER_DIR).is_dir())
        .map(Path::to_path_buf)
        .ok_or_else(not_found)
}
