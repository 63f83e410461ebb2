use std::fmt;

use async_trait::async_trait;

use super::{CheckOutcome, CheckerError, ContentChecker, Document, compare_found, xpath};
use crate::{config::ConfigurationError, models::CheckDefinition};

/// Compares the text at an XPath-style path into a JSON document with an
/// expected value.
///
/// The body is viewed as a tree of elements named after object keys under a
/// synthetic `root` element. `//somedata/somekey` selects `"somekey"` inside
/// any `"somedata"` object.
#[derive(Debug)]
pub struct JsonPathChecker {
    name: String,
    path: String,
    value: String,
    expected: bool,
}

impl JsonPathChecker {
    /// Validates `path` as an XPath expression.
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        value: impl Into<String>,
        expected: bool,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let path = path.into();
        xpath::validate(&path).map_err(|reason| ConfigurationError::InvalidExpression {
            checker: name.clone(),
            expression: path.clone(),
            reason,
        })?;
        Ok(Self { name, path, value: value.into(), expected })
    }

    /// Builds the checker from a stored check; `path` is required.
    pub fn from_definition(def: &CheckDefinition) -> Result<Self, ConfigurationError> {
        let path = def.path.clone().ok_or_else(|| ConfigurationError::MissingOption {
            component: def.name.clone(),
            option: "path".to_string(),
        })?;
        Self::new(def.name.clone(), path, def.value.clone(), def.expected)
    }

    fn evaluate_bytes(&self, body: &[u8]) -> CheckOutcome {
        let json: serde_json::Value = match serde_json::from_slice(body) {
            Ok(json) => json,
            Err(e) => return CheckOutcome::failed(false, CheckerError::InvalidJson(e.to_string())),
        };
        match xpath::first_text_in_json(&json, &self.path) {
            Ok(found) => {
                CheckOutcome::passed(compare_found(found.as_deref(), &self.value, self.expected))
            }
            Err(e) => CheckOutcome::failed(false, e),
        }
    }
}

impl fmt::Display for JsonPathChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.expected { "is" } else { "is not" };
        write!(f, "{} - '{}' {} '{}'", self.name, self.path, verb, self.value)
    }
}

#[async_trait]
impl ContentChecker for JsonPathChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "JsonPathChecker"
    }

    async fn evaluate(&self, document: &Document<'_>) -> CheckOutcome {
        match document.bytes().await {
            Ok(body) => self.evaluate_bytes(&body),
            Err(e) => CheckOutcome::failed(false, e),
        }
    }
}
