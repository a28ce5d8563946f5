//! Placeholder parsing for `{variable}` style templates.
//!
//! Rendering and variable extraction both go through [`parse`] so they always
//! agree on what counts as a placeholder. `{{` and `}}` are literal braces and
//! a `:format` or `!conversion` suffix inside a placeholder is ignored for naming.

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
}

pub fn parse(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    match inner {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => {
                            return Err(Error::validation(format!(
                                "nested '{{' in placeholder starting at byte {}",
                                pos
                            )))
                        }
                        other => field.push(other),
                    }
                }
                if !closed {
                    return Err(Error::validation(format!(
                        "unclosed '{{' at byte {} in template",
                        pos
                    )));
                }
                let name = field
                    .split(|ch| ch == ':' || ch == '!')
                    .next()
                    .unwrap_or_default()
                    .trim();
                if name.is_empty() {
                    return Err(Error::validation(format!(
                        "unnamed placeholder at byte {} in template",
                        pos
                    )));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(name.to_string()));
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '}' => {
                return Err(Error::validation(format!(
                    "single '}}' at byte {} in template",
                    pos
                )))
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Distinct placeholder names in order of first appearance.
pub fn variables(template: &str) -> Result<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for segment in parse(template)? {
        if let Segment::Placeholder(name) = segment {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// Substitute every placeholder from `vars`. A placeholder without a value is
/// an error; nothing is ever replaced by an empty string implicitly.
pub fn render(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    for segment in parse(template)? {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Placeholder(name) => match vars.get(&name) {
                Some(value) => out.push_str(value),
                None => return Err(Error::MissingVariable { name }),
            },
        }
    }
    Ok(out)
}

/// Text form of a JSON value as it should appear inside a prompt.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn variables_are_distinct_and_ordered() {
        let names = variables("{greeting}, {name}! {name:>10} {topic!r}").unwrap();
        assert_eq!(names, vec!["greeting", "name", "topic"]);
    }

    #[test]
    fn escaped_braces_are_not_placeholders() {
        assert_eq!(variables("JSON: {{\"a\": {value}}}").unwrap(), vec!["value"]);
        let rendered = render("{{literal}} {x}", &vars(&[("x", "1")])).unwrap();
        assert_eq!(rendered, "{literal} 1");
    }

    #[test]
    fn render_substitutes_all_occurrences() {
        let out = render("Hello {name}, bye {name}", &vars(&[("name", "Ann")])).unwrap();
        assert_eq!(out, "Hello Ann, bye Ann");
    }

    #[test]
    fn render_reports_missing_variable_by_name() {
        let err = render("Hello {name} from {place}", &vars(&[("name", "Ann")])).unwrap_err();
        assert!(matches!(err, Error::MissingVariable { ref name } if name == "place"));
    }

    #[test]
    fn unbalanced_braces_are_rejected() {
        assert!(parse("Hello {name").is_err());
        assert!(parse("Hello name}").is_err());
        assert!(parse("Hello {}").is_err());
    }

    #[test]
    fn value_to_text_unquotes_strings() {
        assert_eq!(value_to_text(&Value::String("hi".into())), "hi");
        assert_eq!(value_to_text(&serde_json::json!(3)), "3");
        assert_eq!(value_to_text(&serde_json::json!([1, 2])), "[1,2]");
    }
}
