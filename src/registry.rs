//! The project's model registry (`.promptkeep/models.yaml`).

use crate::error::{Error, Result};
use crate::fsio;
use crate::models::ModelConfig;
use crate::project::Project;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    project: Project,
}

impl ModelRegistry {
    pub fn new(project: Project) -> Self {
        Self { project }
    }

    /// All configured models. A missing registry file is created empty.
    pub async fn load(&self) -> Result<Vec<ModelConfig>> {
        let path = self.project.models_path();
        let models: Vec<ModelConfig> = match fsio::read_yaml(&path).await {
            Ok(models) => models,
            Err(Error::FileNotFound { .. }) => {
                self.save(&[]).await?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        for (index, model) in models.iter().enumerate() {
            model
                .validate()
                .map_err(|e| Error::malformed(&path, format!("entry {}: {}", index, e)))?;
        }
        debug!(count = models.len(), "Loaded model registry");
        Ok(models)
    }

    pub async fn save(&self, models: &[ModelConfig]) -> Result<()> {
        fsio::atomic_write_yaml(&self.project.models_path(), models).await
    }

    /// Look up a model by registry name.
    pub async fn get(&self, name: &str) -> Result<Option<ModelConfig>> {
        Ok(self.load().await?.into_iter().find(|m| m.name == name))
    }

    /// Add `config`, replacing any entry with the same name.
    pub async fn add(&self, config: ModelConfig) -> Result<()> {
        config.validate()?;
        let mut models = self.load().await?;
        models.retain(|m| m.name != config.name);
        info!(name = %config.name, "Registered model");
        models.push(config);
        self.save(&models).await
    }

    /// Returns whether an entry was removed.
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let mut models = self.load().await?;
        let before = models.len();
        models.retain(|m| m.name != name);
        if models.len() == before {
            return Ok(false);
        }
        self.save(&models).await?;
        info!(name, "Removed model");
        Ok(true)
    }

    /// Make `name` the project's default model.
    pub async fn set_default(&self, name: &str) -> Result<()> {
        if self.get(name).await?.is_none() {
            return Err(Error::ModelNotConfigured {
                name: name.to_string(),
            });
        }
        let mut config = self.project.load_config().await?;
        config.default_model = name.to_string();
        self.project.save_config(&config).await
    }
}
