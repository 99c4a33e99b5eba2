//! @ai:module:intent Snap free-form model output onto a fixed label set
//! @ai:module:layer domain
//! @ai:module:public_api snap_to_rail, LabelParser, ParsedLabel, NOT_PARSABLE
//! @ai:module:stateless true

use regex::Regex;

/// Label recorded when the response names no rail, or more than one
pub const NOT_PARSABLE: &str = "NOT_PARSABLE";

/// Instruction appended to the prompt when explanations are requested
pub const EXPLANATION_INSTRUCTIONS: &str = "\n\nFirst write \"EXPLANATION:\" followed by a short \
step-by-step explanation of your reasoning. Then write \"LABEL:\" followed by exactly one of the \
allowed labels and nothing else.";

/// @ai:intent Return the single rail mentioned in the response, matched as a whole word
///            ignoring case; NOT_PARSABLE when zero or several rails match
/// @ai:effects pure
pub fn snap_to_rail(response: &str, rails: &[String]) -> String {
    let found: Vec<&String> = rails
        .iter()
        .filter(|rail| mentions(response, rail))
        .collect();

    match found.as_slice() {
        [rail] => (*rail).clone(),
        [] => {
            tracing::debug!("No rail found in response: {:?}", response);
            NOT_PARSABLE.to_string()
        }
        _ => {
            tracing::debug!("Multiple rails found in response: {:?}", found);
            NOT_PARSABLE.to_string()
        }
    }
}

fn mentions(response: &str, rail: &str) -> bool {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(rail.trim())))
        .map(|re| re.is_match(response))
        .unwrap_or(false)
}

/// @ai:intent Label and optional explanation parsed from one response
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLabel {
    pub label: String,
    pub explanation: Option<String>,
}

/// @ai:intent Parses `EXPLANATION: ... LABEL: ...` responses
pub struct LabelParser {
    rails: Vec<String>,
    explained_regex: Regex,
}

impl LabelParser {
    /// @ai:intent Create a parser for the given rails
    /// @ai:effects pure
    pub fn new(rails: Vec<String>) -> Self {
        Self {
            rails,
            explained_regex: Regex::new(r"(?is)EXPLANATION:\s*(.*?)\s*LABEL:\s*(.*)")
                .expect("Invalid regex"),
        }
    }

    pub fn rails(&self) -> &[String] {
        &self.rails
    }

    /// @ai:intent Parse a response; without a LABEL marker the whole text is snapped
    /// @ai:effects pure
    pub fn parse(&self, response: &str, with_explanation: bool) -> ParsedLabel {
        if with_explanation {
            if let Some(caps) = self.explained_regex.captures(response) {
                let explanation = caps[1].trim();
                return ParsedLabel {
                    label: snap_to_rail(caps[2].trim(), &self.rails),
                    explanation: (!explanation.is_empty()).then(|| explanation.to_string()),
                };
            }
        }

        ParsedLabel {
            label: snap_to_rail(response, &self.rails),
            explanation: None,
        }
    }
}
