use crate::error::Result;
use crate::models::{Prompt, PromptId, Version};
use async_trait::async_trait;

pub mod filesystem;
pub mod versions;

pub use filesystem::FileSystemStorage;
pub use versions::VersionStore;

/// Trait defining the interface for prompt storage backends.
#[async_trait]
pub trait PromptStorage: Send + Sync + 'static {
    /// Lists all readable prompts, most recently updated first.
    /// Records that fail to parse are skipped.
    async fn list_prompts(&self) -> Result<Vec<Prompt>>;

    /// Loads a prompt. `PromptNotFound` if absent, `Malformed` if corrupt.
    async fn load_prompt(&self, id: &PromptId) -> Result<Prompt>;

    /// Saves a prompt, overwriting any existing record wholesale.
    /// Never touches version history.
    async fn save_prompt(&self, prompt: &Prompt) -> Result<()>;

    /// Deletes a prompt and its entire version history.
    /// `PromptNotFound` if the prompt record does not exist.
    async fn delete_prompt(&self, id: &PromptId) -> Result<()>;

    /// Records the prompt's current state as the next version.
    async fn create_snapshot(&self, id: &PromptId, message: Option<String>) -> Result<Version>;

    /// Allocates an unused sequential id.
    async fn next_id(&self) -> Result<PromptId>;

    /// Like [`PromptStorage::load_prompt`] but maps absence to `None`.
    async fn get_prompt(&self, id: &PromptId) -> Result<Option<Prompt>> {
        match self.load_prompt(id).await {
            Ok(prompt) => Ok(Some(prompt)),
            Err(crate::Error::PromptNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
