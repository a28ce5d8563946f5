//! Error types for prompt storage, versioning and optimization.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the library. Every variant names the id, path or
/// model involved so callers can render an actionable message.
#[derive(Error, Debug)]
pub enum Error {
    /// No `.promptkeep` marker directory above the start directory.
    #[error("no .promptkeep directory found in '{start}' or any parent directory")]
    ProjectNotFound { start: PathBuf },

    #[error("prompt '{id}' not found")]
    PromptNotFound { id: String },

    #[error("version {version} of prompt '{id}' not found")]
    VersionNotFound { id: String, version: u32 },

    #[error("dataset file not found: {path}")]
    DatasetNotFound { path: PathBuf },

    /// The dataset exists but held no parseable records.
    #[error("dataset '{path}' contains no valid records")]
    EmptyDataset { path: PathBuf },

    #[error("model '{name}' is not configured in the model registry")]
    ModelNotConfigured { name: String },

    #[error("unknown optimization strategy '{name}' (available: {})", .available.join(", "))]
    UnknownStrategy {
        name: String,
        available: Vec<String>,
    },

    /// A data model invariant was violated at construction time.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("missing template variable '{name}'")]
    MissingVariable { name: String },

    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// File exists but could not be parsed.
    #[error("malformed file '{path}': {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model '{model}' needs the environment variable '{var}' to be set")]
    MissingCredential { model: String, var: String },

    #[error("serialization failed: {0}")]
    Serialize(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for the "record is absent" family of errors, as opposed to
    /// corrupt or unreadable records.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound { .. }
                | Self::PromptNotFound { .. }
                | Self::VersionNotFound { .. }
                | Self::DatasetNotFound { .. }
                | Self::ProjectNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_strategy_lists_available_names() {
        let err = Error::UnknownStrategy {
            name: "genetic".into(),
            available: vec!["few_shot".into(), "noop".into()],
        };
        assert_eq!(
            err.to_string(),
            "unknown optimization strategy 'genetic' (available: few_shot, noop)"
        );
    }

    #[test]
    fn not_found_family_is_distinguished_from_malformed() {
        assert!(Error::FileNotFound { path: "a.json".into() }.is_not_found());
        assert!(!Error::malformed("a.json", "expected value").is_not_found());
    }
}
