use std::fmt;

use ::regex::bytes::Regex;
use async_trait::async_trait;

use super::{CheckOutcome, ContentChecker, Document};
use crate::{config::ConfigurationError, models::CheckDefinition};

/// Passes when a regular expression finds (or, when not expected, does not
/// find) a match anywhere in the body.
#[derive(Debug)]
pub struct RegexChecker {
    name: String,
    pattern: Regex,
    expected: bool,
}

impl RegexChecker {
    /// Compiles the pattern. An invalid pattern is a configuration error.
    pub fn new(name: impl Into<String>, pattern: &str, expected: bool) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let pattern = Regex::new(pattern).map_err(|e| ConfigurationError::InvalidExpression {
            checker: name.clone(),
            expression: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { name, pattern, expected })
    }

    /// Builds the checker from a definition, using `value` as the pattern.
    pub fn from_definition(def: &CheckDefinition) -> Result<Self, ConfigurationError> {
        Self::new(def.name.clone(), &def.value, def.expected)
    }
}

impl fmt::Display for RegexChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.expected { "found" } else { "not found" };
        write!(f, "{} - '{}' {}", self.name, self.pattern.as_str(), verb)
    }
}

#[async_trait]
impl ContentChecker for RegexChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "RegexChecker"
    }

    async fn evaluate(&self, document: &Document<'_>) -> CheckOutcome {
        match document.bytes().await {
            Ok(body) => CheckOutcome::passed(self.pattern.is_match(&body) == self.expected),
            Err(e) => CheckOutcome::failed(false, e),
        }
    }
}
