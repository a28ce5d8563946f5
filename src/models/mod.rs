pub mod model_config;
pub mod project_config;
pub mod prompt;
pub mod template;
pub mod version;

pub use model_config::ModelConfig;
pub use project_config::ProjectConfig;
pub use prompt::{Prompt, PromptId};
pub use version::Version;
