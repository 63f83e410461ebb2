use std::fmt;

use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{CheckOutcome, CheckerError, ContentChecker, Document};
use crate::{config::ConfigurationError, models::CheckDefinition};

/// Compares the visible text of the first element a CSS selector matches
/// with an expected value.
///
/// Meant for rendered pages, where the selector runs in the browser after
/// scripts have run. Static bodies are queried with an HTML5 parser.
#[derive(Debug)]
pub struct RenderedSelectorChecker {
    name: String,
    selector: String,
    value: String,
    expected: bool,
}

impl RenderedSelectorChecker {
    /// Validates `selector` as a CSS selector.
    pub fn new(
        name: impl Into<String>,
        selector: impl Into<String>,
        value: impl Into<String>,
        expected: bool,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let selector = selector.into();
        if let Err(reason) = Selector::parse(&selector).map_err(|e| e.to_string()) {
            return Err(ConfigurationError::InvalidExpression {
                checker: name,
                expression: selector,
                reason,
            });
        }
        Ok(Self { name, selector, value: value.into(), expected })
    }

    /// Builds the checker from a stored check; `path` holds the selector.
    pub fn from_definition(def: &CheckDefinition) -> Result<Self, ConfigurationError> {
        let path = def.path.clone().ok_or_else(|| ConfigurationError::MissingOption {
            component: def.name.clone(),
            option: "path".to_string(),
        })?;
        Self::new(def.name.clone(), path, def.value.clone(), def.expected)
    }

    fn select_static(&self, body: &[u8]) -> Result<String, CheckerError> {
        let html = Html::parse_document(&String::from_utf8_lossy(body));
        let selector = Selector::parse(&self.selector)
            .map_err(|_| CheckerError::ElementNotFound(self.selector.clone()))?;
        html.select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .ok_or_else(|| CheckerError::ElementNotFound(self.selector.clone()))
    }

    fn compare(&self, found: Result<String, CheckerError>) -> CheckOutcome {
        match found {
            // An element that cannot be read passes only when the value is
            // not expected, and the error is still reported.
            Err(e) => CheckOutcome::failed(!self.expected, e),
            Ok(text) => CheckOutcome::passed((text == self.value) == self.expected),
        }
    }
}

impl fmt::Display for RenderedSelectorChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.expected { "is" } else { "is not" };
        write!(f, "{} - '{}' {} '{}'", self.name, self.selector, verb, self.value)
    }
}

#[async_trait]
impl ContentChecker for RenderedSelectorChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "HtmlRenderSelectorChecker"
    }

    async fn evaluate(&self, document: &Document<'_>) -> CheckOutcome {
        let found = match document {
            Document::Static(body) => self.select_static(body),
            Document::Rendered(page) => page.select_text(&self.selector).await.map_err(|e| match e {
                crate::fetch::RenderError::ElementNotFound(selector) => {
                    CheckerError::ElementNotFound(selector)
                }
                other => CheckerError::Render(other.to_string()),
            }),
        };
        self.compare(found)
    }
}
