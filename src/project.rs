//! Project root discovery, on-disk layout and project configuration.

use crate::error::{Error, Result};
use crate::fsio::{self, MARKER_DIR};
use crate::models::ProjectConfig;
use crate::registry::ModelRegistry;
use crate::storage::FileSystemStorage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_FILE: &str = "config.yaml";
const MODELS_FILE: &str = "models.yaml";
const VERSIONS_DIR: &str = "versions";
const DATASET_FILE: &str = "dataset.jsonl";

/// A directory containing a `.promptkeep` marker directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    /// Find the project containing `start` (or one of its parents).
    pub fn discover(start: &Path) -> Result<Self> {
        let root = fsio::find_project_root(start)?;
        debug!(root = %root.display(), "Found project root");
        Ok(Self { root })
    }

    /// Create the marker directory, default config and prompts directory
    /// under `path`. An existing config is kept as is.
    pub async fn init(path: &Path) -> Result<Self> {
        let project = Self {
            root: path.to_path_buf(),
        };
        fsio::ensure_dir(&project.marker_dir()).await?;
        let config = project.load_config().await?;
        fsio::ensure_dir(&project.prompts_dir(&config)).await?;
        fsio::ensure_dir(&project.versions_dir()).await?;
        info!(root = %project.root.display(), "Initialized project");
        Ok(project)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn marker_dir(&self) -> PathBuf {
        self.root.join(MARKER_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.marker_dir().join(CONFIG_FILE)
    }

    pub fn models_path(&self) -> PathBuf {
        self.marker_dir().join(MODELS_FILE)
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.marker_dir().join(VERSIONS_DIR)
    }

    /// Dataset used by optimization when none is given explicitly.
    pub fn default_dataset_path(&self) -> PathBuf {
        self.marker_dir().join(DATASET_FILE)
    }

    pub fn prompts_dir(&self, config: &ProjectConfig) -> PathBuf {
        self.marker_dir().join(&config.prompts_dir)
    }

    /// Load the project config. If the file does not exist yet the defaults
    /// are written and returned.
    pub async fn load_config(&self) -> Result<ProjectConfig> {
        let path = self.config_path();
        match fsio::read_yaml::<ProjectConfig>(&path).await {
            Ok(config) => Ok(config),
            Err(Error::FileNotFound { .. }) => {
                let config = ProjectConfig::default();
                self.save_config(&config).await?;
                Ok(config)
            }
            Err(e) => Err(e),
        }
    }

    /// Rewrite the whole config file.
    pub async fn save_config(&self, config: &ProjectConfig) -> Result<()> {
        fsio::atomic_write_yaml(&self.config_path(), config).await
    }

    pub fn storage(&self, config: &ProjectConfig) -> FileSystemStorage {
        FileSystemStorage::new(self.prompts_dir(config), self.versions_dir())
    }

    pub fn registry(&self) -> ModelRegistry {
        ModelRegistry::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn init_creates_layout_and_is_discoverable() {
        let temp = TempDir::new().unwrap();
        let project = Project::init(temp.path()).await.unwrap();

        assert!(project.config_path().is_file());
        assert!(project.marker_dir().join("prompts").is_dir());

        let nested = temp.path().join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();
        let found = Project::discover(&nested).unwrap();
        assert_eq!(found.root(), temp.path().canonicalize().unwrap());
    }

    #[tokio::test]
    async fn init_keeps_existing_config() {
        let temp = TempDir::new().unwrap();
        let project = Project::init(temp.path()).await.unwrap();
        let mut config = project.load_config().await.unwrap();
        config.default_model = "house-model".into();
        project.save_config(&config).await.unwrap();

        let project = Project::init(temp.path()).await.unwrap();
        assert_eq!(
            project.load_config().await.unwrap().default_model,
            "house-model"
        );
    }

    #[tokio::test]
    async fn custom_prompts_dir_is_relative_to_marker() {
        let temp = TempDir::new().unwrap();
        let project = Project::init(temp.path()).await.unwrap();
        let mut config = project.load_config().await.unwrap();
        config.set_key("prompts_dir", "library").unwrap();
        project.save_config(&config).await.unwrap();

        let reloaded = project.load_config().await.unwrap();
        assert_eq!(
            project.storage(&reloaded).prompt_dir(),
            project.marker_dir().join("library")
        );
    }

    #[tokio::test]
    async fn malformed_config_is_surfaced() {
        let temp = TempDir::new().unwrap();
        let project = Project::init(temp.path()).await.unwrap();
        std::fs::write(project.config_path(), "auto_version: [unterminated").unwrap();
        assert!(matches!(
            project.load_config().await,
            Err(Error::Malformed { .. })
        ));
    }
}
