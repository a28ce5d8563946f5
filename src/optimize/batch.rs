//! Optimizing every prompt of a project in one pass.

use super::few_shot::FEW_SHOT;
use super::{load_dataset, OptimizationEngine};
use crate::error::Result;
use crate::models::Prompt;
use crate::project::Project;
use crate::storage::{FileSystemStorage, PromptStorage};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub strategy: String,
    /// Defaults to the project's `dataset.jsonl`.
    pub dataset_path: Option<PathBuf>,
    /// Upper bound on optimization rounds per prompt; at least one runs.
    pub max_iterations: usize,
    /// Report what would be optimized without calling any strategy.
    pub dry_run: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            strategy: FEW_SHOT.to_string(),
            dataset_path: None,
            max_iterations: 1,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchStatus {
    /// `applied` rounds changed and saved the template; zero means the
    /// strategy had nothing to add.
    Optimized { applied: usize },
    DryRun,
    /// The prompt's model is not in the registry.
    SkippedModel { model: String },
    /// A round failed; earlier rounds stay saved.
    Failed { applied: usize, error: String },
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optimized { applied: 0 } => f.write_str("unchanged"),
            Self::Optimized { applied } => write!(f, "optimized ({} iter)", applied),
            Self::DryRun => f.write_str("dry-run"),
            Self::SkippedModel { model } => write!(f, "skipped (model '{}' not configured)", model),
            Self::Failed { applied, error } => {
                write!(f, "failed after {} iter: {}", applied, error)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub id: crate::models::PromptId,
    pub name: String,
    pub status: BatchStatus,
}

impl OptimizationEngine {
    /// Optimize and save every prompt in `project`.
    ///
    /// Each prompt is optimized repeatedly until its template stops changing
    /// or `max_iterations` rounds have run. With `auto_version` on, the first
    /// change to a prompt is preceded by a snapshot. A prompt whose model is
    /// not configured, or whose optimization fails, is reported and the batch
    /// moves on; an unknown strategy or unusable dataset aborts up front.
    #[instrument(skip(self, project, options), fields(strategy = %options.strategy))]
    pub async fn optimize_all(
        &self,
        project: &Project,
        options: &BatchOptions,
    ) -> Result<Vec<BatchOutcome>> {
        self.strategies.get(&options.strategy)?;
        let config = project.load_config().await?;
        let storage = project.storage(&config);
        let dataset_path = options
            .dataset_path
            .clone()
            .unwrap_or_else(|| project.default_dataset_path());
        load_dataset(&dataset_path).await?;

        let registry = project.registry();
        let prompts = storage.list_prompts().await?;
        let mut outcomes = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            let model = prompt
                .model_name
                .clone()
                .unwrap_or_else(|| config.default_model.clone());
            let status = if registry.get(&model).await?.is_none() {
                warn!(id = %prompt.id, model = %model, "Model not configured, skipping prompt");
                BatchStatus::SkippedModel { model }
            } else if options.dry_run {
                BatchStatus::DryRun
            } else {
                let run = Run {
                    project,
                    storage: &storage,
                    auto_version: config.auto_version,
                    dataset_path: &dataset_path,
                    options,
                };
                self.iterate(&run, &prompt).await?
            };
            outcomes.push(BatchOutcome {
                id: prompt.id,
                name: prompt.name,
                status,
            });
        }
        info!(prompts = outcomes.len(), dry_run = options.dry_run, "Batch optimization finished");
        Ok(outcomes)
    }

    async fn iterate(&self, run: &Run<'_>, prompt: &Prompt) -> Result<BatchStatus> {
        let mut current = prompt.template.clone();
        let mut applied = 0;
        for round in 1..=run.options.max_iterations.max(1) {
            let optimized = match self
                .optimize_in(
                    run.project,
                    &prompt.id,
                    &run.options.strategy,
                    Some(run.dataset_path),
                )
                .await
            {
                Ok(optimized) => optimized,
                Err(e) => {
                    warn!(id = %prompt.id, round, error = %e, "Optimization round failed");
                    return Ok(BatchStatus::Failed {
                        applied,
                        error: e.to_string(),
                    });
                }
            };
            if optimized.template == current {
                debug!(id = %prompt.id, round, "No change, stopping");
                break;
            }
            if applied == 0 && run.auto_version {
                let message = format!("Before batch optimization: strategy={}", run.options.strategy);
                run.storage.create_snapshot(&prompt.id, Some(message)).await?;
            }
            run.storage.save_prompt(&optimized).await?;
            current = optimized.template;
            applied += 1;
        }
        Ok(BatchStatus::Optimized { applied })
    }
}

struct Run<'a> {
    project: &'a Project,
    storage: &'a FileSystemStorage,
    auto_version: bool,
    dataset_path: &'a Path,
    options: &'a BatchOptions,
}
