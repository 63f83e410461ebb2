//! Content checkers: predicates evaluated against a fetched document.
//!
//! Every checker implements [`ContentChecker`] and is built from a
//! [`CheckDefinition`](crate::models::CheckDefinition) through the
//! [`CheckerRegistry`]. Construction validates the expression, so a
//! checker that exists is always evaluable; runtime problems (an unparsable
//! body, a missing element) are reported inside the [`CheckOutcome`].

mod error;
mod html_xpath;
mod json_path;
mod pattern;
mod registry;
mod rendered_selector;
mod xpath;

use std::{fmt, sync::Arc};

use async_trait::async_trait;

pub use error::CheckerError;
pub use html_xpath::HtmlXPathChecker;
pub use json_path::JsonPathChecker;
pub use pattern::RegexChecker;
pub use registry::{CheckerConstructor, CheckerRegistry};
pub use rendered_selector::RenderedSelectorChecker;

use crate::{
    fetch::RenderedPage,
    models::{Aggregation, CheckResult, ResultSet},
};

/// The artifact a checker is evaluated against.
#[derive(Clone, Copy)]
pub enum Document<'a> {
    /// The raw response body of a plain fetch.
    Static(&'a [u8]),
    /// A live page in a remote browser.
    Rendered(&'a dyn RenderedPage),
}

impl Document<'_> {
    /// The document as HTML text. For rendered pages this is the serialized
    /// DOM after scripts ran.
    pub async fn html(&self) -> Result<String, CheckerError> {
        match self {
            Document::Static(body) => Ok(String::from_utf8_lossy(body).into_owned()),
            Document::Rendered(page) => {
                page.html().await.map_err(|e| CheckerError::Render(e.to_string()))
            }
        }
    }

    /// The document as raw bytes.
    pub async fn bytes(&self) -> Result<Vec<u8>, CheckerError> {
        match self {
            Document::Static(body) => Ok(body.to_vec()),
            Document::Rendered(_) => self.html().await.map(String::into_bytes),
        }
    }
}

impl fmt::Debug for Document<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Document::Static(body) => write!(f, "Static({} bytes)", body.len()),
            Document::Rendered(_) => f.write_str("Rendered"),
        }
    }
}

/// The result of evaluating one checker.
#[derive(Debug)]
pub struct CheckOutcome {
    /// Whether the checker passed.
    pub matched: bool,
    /// The problem hit while evaluating, if any.
    pub error: Option<CheckerError>,
}

impl CheckOutcome {
    /// A clean evaluation.
    pub fn passed(matched: bool) -> Self {
        Self { matched, error: None }
    }

    /// An evaluation that hit an error.
    pub fn failed(matched: bool, error: CheckerError) -> Self {
        Self { matched, error: Some(error) }
    }
}

/// A predicate over fetched content.
#[async_trait]
pub trait ContentChecker: Send + Sync + fmt::Display + fmt::Debug {
    /// The configured name.
    fn name(&self) -> &str;

    /// The stable type tag reported in results.
    fn kind(&self) -> &'static str;

    /// Evaluates the checker against a document.
    async fn evaluate(&self, document: &Document<'_>) -> CheckOutcome;
}

/// Applies the shared truth table of path based checkers: an absent node
/// passes only when the value is not expected, a present node passes when
/// its text equality agrees with the expectation.
pub(crate) fn compare_found(found: Option<&str>, value: &str, expected: bool) -> bool {
    match found {
        None => !expected,
        Some(text) => (text == value) == expected,
    }
}

/// Runs every checker in order and collects a [`ResultSet`]. Errors stay
/// inside their own result and never stop the remaining checkers.
pub async fn evaluate_all(
    checkers: &[Arc<dyn ContentChecker>],
    document: &Document<'_>,
    aggregation: Aggregation,
) -> ResultSet {
    let mut results = ResultSet::new(aggregation);
    for checker in checkers {
        let outcome = checker.evaluate(document).await;
        if let Some(error) = &outcome.error {
            tracing::debug!(checker = %checker, error = %error, "Checker reported an error.");
        }
        results.push(CheckResult::new(
            checker.kind(),
            checker.to_string(),
            outcome.matched,
            outcome.error.map(|e| e.to_string()),
        ));
    }
    results
}
