use crate::error::{Error, Result};
use crate::models::template;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Opaque, filesystem-safe prompt identifier (`[A-Za-z0-9_-]+`).
///
/// Sequentially allocated ids are plain integers rendered as text; older
/// files that stored the id as a JSON number are still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IdRepr", into = "String")]
pub struct PromptId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(u64),
    Text(String),
}

impl TryFrom<IdRepr> for PromptId {
    type Error = Error;

    fn try_from(repr: IdRepr) -> Result<Self> {
        match repr {
            IdRepr::Number(n) => Ok(Self(n.to_string())),
            IdRepr::Text(s) => Self::new(s),
        }
    }
}

impl From<PromptId> for String {
    fn from(id: PromptId) -> Self {
        id.0
    }
}

impl PromptId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > 128 {
            return Err(Error::validation(format!(
                "prompt id must be 1 to 128 characters, got {}",
                id.len()
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::validation(format!(
                "prompt id '{}' may only contain letters, digits, '-' and '_'",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the id, if it is a sequential integer id.
    pub fn as_number(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl From<u64> for PromptId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl std::str::FromStr for PromptId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named prompt template with metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prompt {
    pub id: PromptId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Template text with `{variable}` placeholders.
    pub template: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Model registry entry overriding the project default for this prompt.
    #[serde(default, alias = "model_config")]
    pub model_name: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Prompt {
    /// Create a prompt stamped with the current time.
    ///
    /// Fails if `name` is blank or `template` is blank after trimming.
    pub fn new(id: PromptId, name: impl Into<String>, template: impl Into<String>) -> Result<Self> {
        let now = Utc::now();
        let prompt = Self {
            id,
            name: name.into(),
            description: None,
            template: template.into(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            model_name: None,
            metadata: BTreeMap::new(),
        };
        prompt.validate()?;
        Ok(prompt)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.trim().is_empty()).then_some(description);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    /// Check the invariants every persisted prompt must hold.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation(format!("prompt '{}' has an empty name", self.id)));
        }
        if self.template.trim().is_empty() {
            return Err(Error::validation(format!(
                "prompt '{}' has an empty template",
                self.id
            )));
        }
        if self.updated_at < self.created_at {
            return Err(Error::validation(format!(
                "prompt '{}' was updated before it was created",
                self.id
            )));
        }
        Ok(())
    }

    /// Replace the template, rejecting blank input.
    pub fn set_template(&mut self, template: impl Into<String>) -> Result<()> {
        let template = template.into();
        if template.trim().is_empty() {
            return Err(Error::validation(format!(
                "template for prompt '{}' cannot be empty",
                self.id
            )));
        }
        self.template = template;
        Ok(())
    }

    /// Advance `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.created_at);
    }

    pub fn variables(&self) -> Result<Vec<String>> {
        template::variables(&self.template)
    }

    pub fn render(&self, vars: &HashMap<String, String>) -> Result<String> {
        template::render(&self.template, vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn id(s: &str) -> PromptId {
        PromptId::new(s).unwrap()
    }

    #[test]
    fn new_rejects_blank_template_and_name() {
        assert!(matches!(
            Prompt::new(id("1"), "greet", "   \n"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            Prompt::new(id("1"), "", "Hello {name}"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn new_sets_equal_timestamps() {
        let p = Prompt::new(id("1"), "greet", "Hello {name}").unwrap();
        assert_eq!(p.created_at, p.updated_at);
        assert!(p.tags.is_empty());
    }

    #[test]
    fn ids_must_be_filesystem_safe() {
        assert!(PromptId::new("summarize-v2_draft").is_ok());
        assert!(PromptId::new("../etc/passwd").is_err());
        assert!(PromptId::new("a b").is_err());
        assert!(PromptId::new("").is_err());
    }

    #[test]
    fn numeric_ids_deserialize_from_json_numbers() {
        let json = r#"{
            "id": 7,
            "name": "n",
            "template": "t",
            "created_at": "2023-01-01T12:00:00Z",
            "updated_at": "2023-01-01T12:00:00Z",
            "model_config": "fast"
        }"#;
        let p: Prompt = serde_json::from_str(json).unwrap();
        assert_eq!(p.id.as_str(), "7");
        assert_eq!(p.id.as_number(), Some(7));
        assert_eq!(p.model_name.as_deref(), Some("fast"));
        assert!(p.metadata.is_empty());
    }

    #[test]
    fn serialized_timestamps_are_iso8601() {
        let mut p = Prompt::new(id("1"), "greet", "Hello {name}").unwrap();
        p.created_at = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap();
        p.updated_at = p.created_at;
        let value = serde_json::to_value(&p).unwrap();
        assert_eq!(value["created_at"], "2023-01-02T03:04:05Z");
        assert_eq!(value["id"], "1");
    }

    #[test]
    fn validate_rejects_updated_before_created() {
        let mut p = Prompt::new(id("1"), "greet", "Hello").unwrap();
        p.updated_at = p.created_at - chrono::Duration::seconds(1);
        assert!(p.validate().is_err());
    }

    #[test]
    fn render_uses_template_variables() {
        let p = Prompt::new(id("1"), "greet", "Hello {name}").unwrap();
        let vars = HashMap::from([("name".to_string(), "World".to_string())]);
        assert_eq!(p.render(&vars).unwrap(), "Hello World");
        assert_eq!(p.variables().unwrap(), vec!["name"]);
    }
}
