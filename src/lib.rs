//! Local, file-backed prompt management.
//!
//! Prompts live as one JSON file each under a project's `.promptkeep`
//! directory, every snapshot is kept as a numbered version, and prompts can
//! be optimized against an example dataset with a pluggable strategy.

pub mod completion;
pub mod error;
pub mod fsio;
pub mod models;
pub mod optimize;
pub mod project;
pub mod registry;
pub mod search;
pub mod storage;

pub use completion::{CompletionClient, CompletionRequest, HttpCompletionClient};
pub use error::{Error, Result};
pub use models::{ModelConfig, ProjectConfig, Prompt, PromptId, Version};
pub use optimize::{BatchOptions, OptimizationEngine, Strategy, StrategyRegistry};
pub use project::Project;
pub use registry::ModelRegistry;
pub use storage::{FileSystemStorage, PromptStorage, VersionStore};
