use crate::models::prompt::{Prompt, PromptId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable, numbered snapshot of a prompt's full state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Version {
    /// 1-based, strictly increasing per prompt.
    pub version: u32,
    pub prompt_id: PromptId,
    /// Complete copy of the prompt at snapshot time.
    pub snapshot: Prompt,
    #[serde(default)]
    pub message: Option<String>,
    /// When the snapshot was taken, independent of the prompt's own timestamps.
    pub created_at: DateTime<Utc>,
}

impl Version {
    pub fn of(prompt: &Prompt, version: u32, message: Option<String>) -> Self {
        Self {
            version,
            prompt_id: prompt.id.clone(),
            snapshot: prompt.clone(),
            message,
            created_at: Utc::now(),
        }
    }

    /// Zero-padded file name for a version number, e.g. `007.json`.
    pub fn file_name(version: u32) -> String {
        format!("{:03}.json", version)
    }

    /// Inverse of [`Version::file_name`]; `None` for anything else,
    /// including unpadded or over-padded numbers such as `1.json`.
    pub fn parse_file_name(file_name: &str) -> Option<u32> {
        let version = file_name.strip_suffix(".json")?.parse().ok()?;
        (Self::file_name(version) == file_name).then_some(version)
    }
}
