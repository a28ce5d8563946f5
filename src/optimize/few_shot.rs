//! Few-shot optimization: append model-vetted demonstrations to a template.
//!
//! Each usable dataset example is tried out by asking the configured model to
//! answer its inputs under the prompt. Examples the model reproduces exactly
//! are preferred, the rest of the successfully answered examples fill any
//! remaining slots, both in dataset order. Any failure along the way leaves
//! the template unchanged.

use crate::completion::{CompletionClient, CompletionRequest};
use crate::error::Result;
use crate::models::project_config::MAX_DEMOS;
use crate::models::{template, ModelConfig, Prompt};
use crate::optimize::dataset::Record;
use crate::optimize::strategy::Strategy;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const FEW_SHOT: &str = "few_shot";
pub const DEFAULT_MAX_DEMOS: usize = 4;

/// Dataset field holding the expected output.
const COMPLETION_FIELD: &str = "completion";

#[derive(Debug, Clone, PartialEq)]
struct Example {
    inputs: Vec<(String, String)>,
    completion: String,
}

pub struct FewShotStrategy {
    client: Arc<dyn CompletionClient>,
    max_demos: usize,
}

impl FewShotStrategy {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            max_demos: DEFAULT_MAX_DEMOS,
        }
    }

    pub fn with_max_demos(mut self, max_demos: usize) -> Self {
        self.max_demos = max_demos.max(1);
        self
    }

    /// Build from the project's `optimization` settings (`max_demos`).
    pub fn from_settings(client: Arc<dyn CompletionClient>, settings: &BTreeMap<String, Value>) -> Self {
        let strategy = Self::new(client);
        match settings.get(MAX_DEMOS) {
            None => strategy,
            Some(value) => match value.as_u64().filter(|n| *n > 0) {
                Some(n) => strategy.with_max_demos(n as usize),
                None => {
                    warn!(value = %value, default = DEFAULT_MAX_DEMOS, "Ignoring invalid optimization.max_demos");
                    strategy
                }
            },
        }
    }

    async fn select_demos<'a>(
        &self,
        prompt: &Prompt,
        examples: &'a [Example],
        model: &ModelConfig,
    ) -> Result<Vec<&'a Example>> {
        let base = CompletionRequest::for_model(model, String::new())?;
        let limit = self.max_demos.min(examples.len());

        let mut exact = Vec::new();
        let mut answered = Vec::new();
        for (index, example) in examples.iter().enumerate() {
            if exact.len() >= limit {
                break;
            }
            let request = base.with_prompt(trial_prompt(&prompt.template, example));
            match self.client.complete(&request).await {
                Ok(answer) if answers_match(&answer, &example.completion) => exact.push(example),
                Ok(_) => answered.push(example),
                Err(e) => debug!(example = index, error = %e, "Completion failed, excluding example"),
            }
        }

        Ok(exact.into_iter().chain(answered).take(limit).collect())
    }
}

#[async_trait]
impl Strategy for FewShotStrategy {
    async fn optimize(
        &self,
        prompt: &Prompt,
        dataset: &[Record],
        model: &ModelConfig,
    ) -> Result<String> {
        let fields = input_fields(&prompt.template);
        let examples = collect_examples(dataset, &fields);
        if examples.is_empty() {
            info!(id = %prompt.id, "No usable examples in dataset, keeping template");
            return Ok(prompt.template.clone());
        }

        let demos = match self.select_demos(prompt, &examples, model).await {
            Ok(demos) => demos,
            Err(e) => {
                warn!(id = %prompt.id, error = %e, "Demonstration selection failed, keeping template");
                return Ok(prompt.template.clone());
            }
        };
        if demos.is_empty() {
            warn!(id = %prompt.id, "No demonstrations selected, keeping template");
            return Ok(prompt.template.clone());
        }

        info!(id = %prompt.id, demos = demos.len(), "Appending few-shot examples");
        Ok(format!("{}{}", prompt.template, examples_block(&demos)))
    }
}

/// Template placeholders minus the reserved output field. An unparseable
/// template has no input fields.
fn input_fields(template_text: &str) -> Vec<String> {
    match template::variables(template_text) {
        Ok(names) => names
            .into_iter()
            .filter(|name| name != COMPLETION_FIELD)
            .collect(),
        Err(e) => {
            warn!(error = %e, "Could not parse template placeholders");
            Vec::new()
        }
    }
}

/// Records carrying every input field and a completion; others are dropped.
fn collect_examples(dataset: &[Record], fields: &[String]) -> Vec<Example> {
    dataset
        .iter()
        .filter_map(|record| {
            let completion = record.get(COMPLETION_FIELD)?;
            let inputs = fields
                .iter()
                .map(|field| Some((field.clone(), template::value_to_text(record.get(field)?))))
                .collect::<Option<Vec<_>>>()?;
            Some(Example {
                inputs,
                completion: template::value_to_text(completion),
            })
        })
        .collect()
}

fn trial_prompt(instruction: &str, example: &Example) -> String {
    let mut text = format!("{}\n\n", instruction);
    for (field, value) in &example.inputs {
        text.push_str(&format!("{}: {}\n", field, value));
    }
    text.push_str("completion:");
    text
}

fn answers_match(answer: &str, expected: &str) -> bool {
    answer.trim().eq_ignore_ascii_case(expected.trim())
}

fn examples_block(demos: &[&Example]) -> String {
    let mut block = String::from("\n\nExamples:\n");
    for demo in demos {
        let mut lines: Vec<String> = demo
            .inputs
            .iter()
            .map(|(field, value)| format!("{}: {}", field, value))
            .collect();
        lines.push(format!("{}: {}", COMPLETION_FIELD, demo.completion));
        block.push('\n');
        block.push_str(&lines.join("\n"));
        block.push('\n');
    }
    block
}
