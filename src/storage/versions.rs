//! Read and restore side of prompt version history.

use crate::error::{Error, Result};
use crate::fsio;
use crate::models::{Prompt, PromptId, Version};
use crate::storage::PromptStorage;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

/// Directory holding the snapshots of one prompt.
pub fn history_dir(versions_dir: &Path, id: &PromptId) -> PathBuf {
    versions_dir.join(id.as_str())
}

/// Version numbers present in `history`, taken from file names.
/// A missing directory has no versions.
pub(crate) async fn version_numbers(history: &Path) -> Result<Vec<u32>> {
    let mut read_dir = match fs::read_dir(history).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(history, e)),
    };

    let mut numbers = Vec::new();
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| Error::io(history, e))?
    {
        if let Some(n) = entry.file_name().to_str().and_then(Version::parse_file_name) {
            numbers.push(n);
        }
    }
    numbers.sort_unstable();
    Ok(numbers)
}

/// Lists, fetches and restores snapshots written by
/// [`PromptStorage::create_snapshot`]. Restores are written back through the
/// wrapped storage's save path.
#[derive(Debug, Clone)]
pub struct VersionStore<S> {
    versions_dir: PathBuf,
    storage: S,
}

impl<S: PromptStorage> VersionStore<S> {
    pub fn new<P: AsRef<Path>>(versions_dir: P, storage: S) -> Self {
        Self {
            versions_dir: versions_dir.as_ref().to_path_buf(),
            storage,
        }
    }

    fn version_path(&self, id: &PromptId, version: u32) -> PathBuf {
        history_dir(&self.versions_dir, id).join(Version::file_name(version))
    }

    /// All readable versions of `id`, oldest first. Empty when the prompt has
    /// no history yet; corrupt snapshot files are skipped.
    pub async fn list_versions(&self, id: &PromptId) -> Result<Vec<Version>> {
        let mut versions = Vec::new();
        for number in version_numbers(&history_dir(&self.versions_dir, id)).await? {
            let path = self.version_path(id, number);
            match fsio::read_json::<Version>(&path).await {
                Ok(version) => versions.push(version),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable version file"),
            }
        }
        versions.sort_by_key(|v| v.version);
        Ok(versions)
    }

    /// A single version, or `None` if that number was never recorded.
    /// A corrupt file for an explicitly requested version is an error.
    pub async fn get_version(&self, id: &PromptId, version: u32) -> Result<Option<Version>> {
        match fsio::read_json::<Version>(&self.version_path(id, version)).await {
            Ok(v) => Ok(Some(v)),
            Err(Error::FileNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Make the snapshot stored as `version` the live prompt.
    ///
    /// Does not snapshot the state being replaced and does not add a version.
    #[instrument(skip(self))]
    pub async fn restore_version(&self, id: &PromptId, version: u32) -> Result<Prompt> {
        let path = self.version_path(id, version);
        let record = self
            .get_version(id, version)
            .await?
            .ok_or_else(|| Error::VersionNotFound {
                id: id.to_string(),
                version,
            })?;

        let prompt = record.snapshot;
        if &prompt.id != id {
            return Err(Error::malformed(
                &path,
                format!("snapshot belongs to prompt '{}'", prompt.id),
            ));
        }
        prompt.validate().map_err(|e| Error::malformed(&path, e))?;

        self.storage.save_prompt(&prompt).await?;
        info!("Restored prompt from snapshot");
        Ok(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileSystemStorage;
    use tempfile::TempDir;

    fn storage(temp: &TempDir) -> FileSystemStorage {
        FileSystemStorage::new(temp.path().join("prompts"), temp.path().join("versions"))
    }

    #[tokio::test]
    async fn list_versions_is_empty_without_history() {
        let temp = TempDir::new().unwrap();
        let versions = storage(&temp)
            .version_store()
            .list_versions(&PromptId::from(999))
            .await
            .unwrap();
        assert!(versions.is_empty());
    }

    #[tokio::test]
    async fn restore_brings_back_old_template_without_new_versions() {
        let temp = TempDir::new().unwrap();
        let store = storage(&temp);
        let versions = store.version_store();
        let mut p = Prompt::new(PromptId::from(1), "Original", "T1").unwrap();
        store.save_prompt(&p).await.unwrap();

        for next in ["T2", "T3"] {
            store.create_snapshot(&p.id, None).await.unwrap();
            p.set_template(next).unwrap();
            p.touch();
            store.save_prompt(&p).await.unwrap();
        }
        store.create_snapshot(&p.id, None).await.unwrap();

        let restored = versions.restore_version(&p.id, 1).await.unwrap();
        assert_eq!(restored.template, "T1");
        assert_eq!(store.load_prompt(&p.id).await.unwrap().template, "T1");

        let numbers: Vec<u32> = versions
            .list_versions(&p.id)
            .await
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn restore_missing_version_is_version_not_found() {
        let temp = TempDir::new().unwrap();
        let err = storage(&temp)
            .version_store()
            .restore_version(&PromptId::from(999), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VersionNotFound { version: 1, .. }));
    }

    #[tokio::test]
    async fn get_version_returns_details_or_none() {
        let temp = TempDir::new().unwrap();
        let store = storage(&temp);
        let p = Prompt::new(PromptId::from(1), "Test", "T").unwrap();
        store.save_prompt(&p).await.unwrap();
        store
            .create_snapshot(&p.id, Some("first version".into()))
            .await
            .unwrap();

        let versions = store.version_store();
        let details = versions.get_version(&p.id, 1).await.unwrap().unwrap();
        assert_eq!(details.version, 1);
        assert_eq!(details.message.as_deref(), Some("first version"));
        assert!(versions.get_version(&p.id, 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_version_is_skipped_in_listing_but_not_on_request() {
        let temp = TempDir::new().unwrap();
        let store = storage(&temp);
        let p = Prompt::new(PromptId::from(1), "Test", "T").unwrap();
        store.save_prompt(&p).await.unwrap();
        store.create_snapshot(&p.id, None).await.unwrap();
        std::fs::write(
            history_dir(store.versions_dir(), &p.id).join(Version::file_name(2)),
            "garbage",
        )
        .unwrap();

        let versions = store.version_store();
        assert_eq!(versions.list_versions(&p.id).await.unwrap().len(), 1);
        assert!(matches!(
            versions.get_version(&p.id, 2).await,
            Err(Error::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn stray_unpadded_file_does_not_duplicate_a_version() {
        let temp = TempDir::new().unwrap();
        let store = storage(&temp);
        let p = Prompt::new(PromptId::from(1), "Test", "T").unwrap();
        store.save_prompt(&p).await.unwrap();
        store.create_snapshot(&p.id, None).await.unwrap();
        let history = history_dir(store.versions_dir(), &p.id);
        std::fs::copy(history.join("001.json"), history.join("1.json")).unwrap();

        let listed = store.version_store().list_versions(&p.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(store.create_snapshot(&p.id, None).await.unwrap().version, 2);
    }
}
