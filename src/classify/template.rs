//! @ai:module:intent Prompt templates with named row placeholders
//! @ai:module:layer domain
//! @ai:module:public_api PromptTemplate, Row
//! @ai:module:stateless true

use crate::executor::ExecutorError;
use regex::{Captures, Regex};
use serde_json::Value;

/// One input record; keys are column names
pub type Row = serde_json::Map<String, Value>;

/// @ai:intent Template with `{name}` placeholders; `{{` and `}}` render literal braces
pub struct PromptTemplate {
    template: String,
    placeholder_regex: Regex,
}

impl PromptTemplate {
    /// @ai:intent Create a template from text
    /// @ai:effects pure
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            placeholder_regex: Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}")
                .expect("Invalid regex"),
        }
    }

    pub fn text(&self) -> &str {
        &self.template
    }

    /// @ai:intent Distinct placeholder names in order of first appearance
    /// @ai:effects pure
    pub fn variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for caps in self.placeholder_regex.captures_iter(&self.template) {
            if let Some(name) = caps.get(1) {
                if !names.iter().any(|n| n == name.as_str()) {
                    names.push(name.as_str().to_string());
                }
            }
        }
        names
    }

    /// @ai:intent Substitute row values into the template
    /// @ai:post Err(MissingInput) when any placeholder is absent or null in the row
    /// @ai:effects pure
    pub fn render(&self, row: &Row) -> Result<String, ExecutorError> {
        let missing: Vec<String> = self
            .variables()
            .into_iter()
            .filter(|name| matches!(row.get(name), None | Some(Value::Null)))
            .collect();

        if !missing.is_empty() {
            return Err(ExecutorError::missing_input(format!(
                "Missing template variables: {}",
                missing.join(", ")
            )));
        }

        let rendered = self
            .placeholder_regex
            .replace_all(&self.template, |caps: &Captures| match caps.get(1) {
                Some(name) => row.get(name.as_str()).map(render_value).unwrap_or_default(),
                None => caps[0][..1].to_string(),
            });

        Ok(rendered.into_owned())
    }
}

/// @ai:intent Render a JSON value as prompt text; strings are inserted without quotes
/// @ai:effects pure
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_variables_are_unique_and_ordered() {
        let template = PromptTemplate::new("Q: {query}\nD: {document}\nAgain: {query}");
        assert_eq!(template.variables(), vec!["query", "document"]);
    }

    #[test]
    fn test_render_substitutes_values() {
        let template = PromptTemplate::new("Is '{document}' relevant to '{query}'? ({count})");
        let rendered = template
            .render(&row(json!({"query": "rust", "document": "ownership", "count": 3})))
            .unwrap();
        assert_eq!(rendered, "Is 'ownership' relevant to 'rust'? (3)");
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        let template = PromptTemplate::new("Return {{\"label\": ...}} for {text}");
        let rendered = template.render(&row(json!({"text": "hi"}))).unwrap();
        assert_eq!(rendered, "Return {\"label\": ...} for hi");
        assert_eq!(template.variables(), vec!["text"]);
    }

    #[test]
    fn test_missing_or_null_field_is_missing_input() {
        let template = PromptTemplate::new("{query} / {document}");
        let err = template
            .render(&row(json!({"query": null})))
            .unwrap_err();

        assert!(err.is_missing_input());
        assert!(err.to_string().contains("query, document"));
    }
}
