//! Prompt optimization: run a named strategy over a dataset and produce the
//! next state of a prompt.
//!
//! A single optimization neither saves the result nor snapshots the prompt it
//! started from; both are up to the caller. [`OptimizationEngine::optimize_all`]
//! is the batch path that does persist.

pub mod batch;
pub mod dataset;
pub mod few_shot;
pub mod strategy;

pub use batch::{BatchOptions, BatchOutcome, BatchStatus};
pub use dataset::{load_dataset, Record};
pub use few_shot::{FewShotStrategy, FEW_SHOT};
pub use strategy::{Strategy, StrategyRegistry};

use crate::completion::CompletionClient;
use crate::error::{Error, Result};
use crate::models::{ModelConfig, Prompt, PromptId};
use crate::project::Project;
use crate::storage::PromptStorage;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

/// Metadata key recording which strategy produced a template.
pub const STRATEGY_METADATA_KEY: &str = "optimization_strategy";

#[derive(Debug, Clone)]
pub struct OptimizationEngine {
    strategies: StrategyRegistry,
}

impl OptimizationEngine {
    pub fn new(strategies: StrategyRegistry) -> Self {
        Self { strategies }
    }

    /// Engine with every built-in strategy, tuned by the project's
    /// `optimization` settings.
    pub fn with_builtins(client: Arc<dyn CompletionClient>, settings: &BTreeMap<String, Value>) -> Self {
        let mut strategies = StrategyRegistry::new();
        strategies.register(
            FEW_SHOT,
            Arc::new(FewShotStrategy::from_settings(client, settings)),
        );
        Self::new(strategies)
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Find the project containing `start_dir`, then [`Self::optimize_in`].
    pub async fn optimize(
        &self,
        start_dir: &Path,
        prompt_id: &PromptId,
        strategy: &str,
        dataset_path: Option<&Path>,
    ) -> Result<Prompt> {
        let project = Project::discover(start_dir)?;
        self.optimize_in(&project, prompt_id, strategy, dataset_path)
            .await
    }

    /// Compute the optimized version of a prompt.
    ///
    /// `dataset_path` defaults to the project's `dataset.jsonl`.
    #[instrument(skip(self, project, dataset_path), fields(root = %project.root().display()))]
    pub async fn optimize_in(
        &self,
        project: &Project,
        prompt_id: &PromptId,
        strategy: &str,
        dataset_path: Option<&Path>,
    ) -> Result<Prompt> {
        let config = project.load_config().await?;
        let original = project.storage(&config).load_prompt(prompt_id).await?;

        let dataset_path = dataset_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| project.default_dataset_path());
        let dataset = load_dataset(&dataset_path).await?;

        let model_name = original
            .model_name
            .clone()
            .unwrap_or_else(|| config.default_model.clone());
        let model = resolve_model(project, &model_name).await?;

        let runner = self.strategies.get(strategy)?;
        let template = runner.optimize(&original, &dataset, &model).await?;

        let mut optimized = original.clone();
        optimized.set_template(template)?;
        optimized.touch();
        optimized.metadata.insert(
            STRATEGY_METADATA_KEY.to_string(),
            Value::String(strategy.to_string()),
        );
        info!(
            model = %model.name,
            examples = dataset.len(),
            changed = optimized.template != original.template,
            "Optimized prompt"
        );
        Ok(optimized)
    }
}

async fn resolve_model(project: &Project, name: &str) -> Result<ModelConfig> {
    project
        .registry()
        .get(name)
        .await?
        .ok_or_else(|| Error::ModelNotConfigured {
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionRequest;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    struct MarkStrategy;

    #[async_trait]
    impl Strategy for MarkStrategy {
        async fn optimize(&self, prompt: &Prompt, _: &[Record], _: &ModelConfig) -> Result<String> {
            Ok(format!("{}\n\n[Optimized by mock]", prompt.template))
        }
    }

    struct Unreachable;

    #[async_trait]
    impl CompletionClient for Unreachable {
        async fn complete(&self, _: &CompletionRequest) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    fn mock_engine() -> OptimizationEngine {
        let mut strategies = StrategyRegistry::new();
        strategies.register(FEW_SHOT, Arc::new(MarkStrategy));
        OptimizationEngine::new(strategies)
    }

    async fn project_with_prompt(temp: &TempDir) -> (Project, Prompt) {
        let project = Project::init(temp.path()).await.unwrap();
        let mut config = project.load_config().await.unwrap();
        config.default_model = "test-model".into();
        project.save_config(&config).await.unwrap();
        project
            .registry()
            .add(ModelConfig::new("test-model", "openai", "gpt-4"))
            .await
            .unwrap();

        std::fs::write(
            project.default_dataset_path(),
            "{\"input\": \"Hello\", \"completion\": \"Hi\"}\n{\"input\": \"How are you?\", \"completion\": \"I'm fine\"}\n",
        )
        .unwrap();

        let mut prompt =
            Prompt::new(PromptId::from(1), "Test Prompt", "You are a chatbot. {input}").unwrap();
        prompt.created_at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        prompt.updated_at = prompt.created_at;
        prompt
            .metadata
            .insert("owner".into(), Value::String("docs".into()));
        project.storage(&config).save_prompt(&prompt).await.unwrap();
        (project, prompt)
    }

    #[tokio::test]
    async fn returns_new_prompt_with_strategy_metadata() {
        let temp = TempDir::new().unwrap();
        let (project, original) = project_with_prompt(&temp).await;

        let optimized = mock_engine()
            .optimize(temp.path(), &original.id, FEW_SHOT, None)
            .await
            .unwrap();

        assert_eq!(optimized.id, original.id);
        assert_eq!(optimized.name, original.name);
        assert_eq!(optimized.created_at, original.created_at);
        assert!(optimized.updated_at > original.updated_at);
        assert!(optimized.template.ends_with("[Optimized by mock]"));
        assert_eq!(optimized.metadata["optimization_strategy"], "few_shot");
        assert_eq!(optimized.metadata["owner"], "docs");

        // Nothing is persisted by the engine itself.
        let config = project.load_config().await.unwrap();
        let stored = project.storage(&config).load_prompt(&original.id).await.unwrap();
        assert_eq!(stored, original);
        assert!(project
            .storage(&config)
            .version_store()
            .list_versions(&original.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unknown_strategy_lists_available() {
        let temp = TempDir::new().unwrap();
        let (_project, original) = project_with_prompt(&temp).await;
        let err = mock_engine()
            .optimize(temp.path(), &original.id, "genetic", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownStrategy { ref available, .. } if available == &vec!["few_shot".to_string()]
        ));
    }

    #[tokio::test]
    async fn failure_modes_in_order() {
        let temp = TempDir::new().unwrap();
        let engine = mock_engine();
        assert!(matches!(
            engine
                .optimize(temp.path(), &PromptId::from(1), FEW_SHOT, None)
                .await,
            Err(Error::ProjectNotFound { .. })
        ));

        let (project, original) = project_with_prompt(&temp).await;
        assert!(matches!(
            engine
                .optimize_in(&project, &PromptId::from(2), FEW_SHOT, None)
                .await,
            Err(Error::PromptNotFound { .. })
        ));

        let missing = temp.path().join("missing.jsonl");
        assert!(matches!(
            engine
                .optimize_in(&project, &original.id, FEW_SHOT, Some(&missing))
                .await,
            Err(Error::DatasetNotFound { .. })
        ));

        let empty = temp.path().join("empty.jsonl");
        std::fs::write(&empty, "\nnot json\n").unwrap();
        assert!(matches!(
            engine
                .optimize_in(&project, &original.id, FEW_SHOT, Some(&empty))
                .await,
            Err(Error::EmptyDataset { .. })
        ));
    }

    #[tokio::test]
    async fn unconfigured_override_is_an_error_naming_it() {
        let temp = TempDir::new().unwrap();
        let (project, original) = project_with_prompt(&temp).await;
        let config = project.load_config().await.unwrap();
        let overridden = original.clone().with_model("ghost-model");
        project.storage(&config).save_prompt(&overridden).await.unwrap();

        let err = mock_engine()
            .optimize_in(&project, &original.id, FEW_SHOT, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ModelNotConfigured { ref name } if name == "ghost-model"));
    }

    #[tokio::test]
    async fn builtin_few_shot_survives_unreachable_model() {
        let temp = TempDir::new().unwrap();
        let (project, original) = project_with_prompt(&temp).await;
        let engine = OptimizationEngine::with_builtins(Arc::new(Unreachable), &BTreeMap::new());

        let optimized = engine
            .optimize_in(&project, &original.id, FEW_SHOT, None)
            .await
            .unwrap();
        assert_eq!(optimized.template, original.template);
        assert_eq!(optimized.metadata["optimization_strategy"], "few_shot");
    }
}
