use crate::error::{Error, Result};
use crate::fsio;
use crate::models::{Prompt, PromptId, Version};
use crate::storage::versions::{self, VersionStore};
use crate::storage::PromptStorage;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Stores one JSON file per prompt under `prompt_dir` and version
/// snapshots under `versions_dir/<id>/NNN.json`.
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    prompt_dir: PathBuf,
    versions_dir: PathBuf,
}

impl FileSystemStorage {
    pub fn new<P: AsRef<Path>, V: AsRef<Path>>(prompt_dir: P, versions_dir: V) -> Self {
        Self {
            prompt_dir: prompt_dir.as_ref().to_path_buf(),
            versions_dir: versions_dir.as_ref().to_path_buf(),
        }
    }

    pub fn prompt_dir(&self) -> &Path {
        &self.prompt_dir
    }

    pub fn versions_dir(&self) -> &Path {
        &self.versions_dir
    }

    pub fn prompt_path(&self, id: &PromptId) -> PathBuf {
        self.prompt_dir.join(format!("{}.json", id))
    }

    /// A version store reading the same history this storage writes.
    pub fn version_store(&self) -> VersionStore<Self> {
        VersionStore::new(&self.versions_dir, self.clone())
    }

    async fn read_prompt_file(&self, path: &Path) -> Result<Prompt> {
        let prompt: Prompt = fsio::read_json(path).await?;
        prompt
            .validate()
            .map_err(|e| Error::malformed(path, e))?;
        Ok(prompt)
    }

    async fn prompt_files(&self) -> Result<Vec<PathBuf>> {
        let mut read_dir = match fs::read_dir(&self.prompt_dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&self.prompt_dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Error::io(&self.prompt_dir, e))?
        {
            let path = entry.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
                files.push(path);
            }
        }
        // Directory order is platform dependent; sorting keeps ties stable.
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl PromptStorage for FileSystemStorage {
    #[instrument(skip(self), fields(dir = %self.prompt_dir.display()))]
    async fn list_prompts(&self) -> Result<Vec<Prompt>> {
        let mut prompts = Vec::new();
        for path in self.prompt_files().await? {
            match self.read_prompt_file(&path).await {
                Ok(prompt) => prompts.push(prompt),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable prompt file"),
            }
        }
        // Stable sort: equal timestamps keep file-name order.
        prompts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        debug!(count = prompts.len(), "Listed prompts");
        Ok(prompts)
    }

    async fn load_prompt(&self, id: &PromptId) -> Result<Prompt> {
        let path = self.prompt_path(id);
        match self.read_prompt_file(&path).await {
            Err(Error::FileNotFound { .. }) => Err(Error::PromptNotFound { id: id.to_string() }),
            other => other,
        }
    }

    #[instrument(skip(self, prompt), fields(id = %prompt.id))]
    async fn save_prompt(&self, prompt: &Prompt) -> Result<()> {
        prompt.validate()?;
        let path = self.prompt_path(&prompt.id);
        fsio::atomic_write_json(&path, prompt).await?;
        debug!(path = %path.display(), "Saved prompt");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_prompt(&self, id: &PromptId) -> Result<()> {
        let path = self.prompt_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(ref e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::PromptNotFound { id: id.to_string() })
            }
            Err(e) => return Err(Error::io(&path, e)),
        }

        let history = versions::history_dir(&self.versions_dir, id);
        match fs::remove_dir_all(&history).await {
            Ok(()) => {}
            Err(ref e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&history, e)),
        }
        info!("Deleted prompt and its version history");
        Ok(())
    }

    #[instrument(skip(self, message))]
    async fn create_snapshot(&self, id: &PromptId, message: Option<String>) -> Result<Version> {
        let current = self.load_prompt(id).await?;
        let history = versions::history_dir(&self.versions_dir, id);
        fsio::ensure_dir(&history).await?;

        // max + 1 rather than count + 1, so a gap never causes reuse.
        let next = versions::version_numbers(&history)
            .await?
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1;

        let version = Version::of(&current, next, message);
        fsio::atomic_write_json(&history.join(Version::file_name(next)), &version).await?;
        info!(version = next, "Created snapshot");
        Ok(version)
    }

    async fn next_id(&self) -> Result<PromptId> {
        let max = self
            .prompt_files()
            .await?
            .iter()
            .filter_map(|path| path.file_stem()?.to_str()?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Ok(PromptId::from(max + 1))
    }
}
