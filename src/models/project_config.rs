use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Project-wide settings, stored whole in `.promptkeep/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Prompt storage directory, relative to the marker directory.
    pub prompts_dir: PathBuf,
    /// Snapshot a prompt before commands that mutate it.
    pub auto_version: bool,
    /// Registry name used when a prompt carries no model override.
    pub default_model: String,
    /// Strategy tuning knobs, e.g. `max_demos`.
    pub optimization: BTreeMap<String, Value>,
}

/// Optimization setting bounding the few-shot demonstration count.
pub const MAX_DEMOS: &str = "max_demos";

fn parse_bool(key: &str, value: &str) -> crate::Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(crate::Error::validation(format!(
            "'{}' expects true/false (or yes/no, on/off, 1/0), got '{}'",
            key, value
        ))),
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            prompts_dir: PathBuf::from("prompts"),
            auto_version: true,
            default_model: "gpt-3.5-turbo".to_string(),
            optimization: BTreeMap::new(),
        }
    }
}

impl ProjectConfig {
    /// Set a top-level key from its textual form.
    ///
    /// Booleans accept `true/1/yes/on` and `false/0/no/off`;
    /// `optimization.<name>` keys are parsed as YAML scalars so numbers stay
    /// numbers, and `optimization.max_demos` must be a positive integer.
    pub fn set_key(&mut self, key: &str, value: &str) -> crate::Result<()> {
        match key {
            "prompts_dir" => self.prompts_dir = PathBuf::from(value),
            "auto_version" => self.auto_version = parse_bool(key, value)?,
            "default_model" => self.default_model = value.to_string(),
            _ => match key.strip_prefix("optimization.") {
                Some(setting) if !setting.is_empty() => {
                    let parsed = serde_yaml_ng::from_str::<Value>(value)
                        .unwrap_or_else(|_| Value::String(value.to_string()));
                    if setting == MAX_DEMOS && !parsed.as_u64().is_some_and(|n| n > 0) {
                        return Err(crate::Error::validation(format!(
                            "'{}' must be a positive integer, got '{}'",
                            key, value
                        )));
                    }
                    self.optimization.insert(setting.to_string(), parsed);
                }
                _ => {
                    return Err(crate::Error::validation(format!(
                        "unknown config key '{}'",
                        key
                    )))
                }
            },
        }
        Ok(())
    }
}
