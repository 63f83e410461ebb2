use std::fmt;

use async_trait::async_trait;

use super::{CheckOutcome, ContentChecker, Document, compare_found, xpath};
use crate::{config::ConfigurationError, models::CheckDefinition};

/// Compares the text of the first node an XPath expression selects in an
/// HTML document with an expected value.
#[derive(Debug)]
pub struct HtmlXPathChecker {
    name: String,
    path: String,
    value: String,
    expected: bool,
}

impl HtmlXPathChecker {
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
}

impl fmt::Display for HtmlXPathChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.expected { "is" } else { "is not" };
        write!(f, "{} - '{}' {} '{}'", self.name, self.path, verb, self.value)
    }
}

#[async_trait]
impl ContentChecker for HtmlXPathChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "HtmlXPathChecker"
    }

    async fn evaluate(&self, document: &Document<'_>) -> CheckOutcome {
        let html = match document.html().await {
            Ok(html) => html,
            Err(e) => return CheckOutcome::failed(false, e),
        };
        match xpath::first_text_in_html(&html, &self.path) {
            Ok(found) => {
                CheckOutcome::passed(compare_found(found.as_deref(), &self.value, self.expected))
            }
            Err(e) => CheckOutcome::failed(false, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{checkers::CheckerError, fetch::MockRenderedPage};

    const PAGE: &str = r#"<html><body><div id="whatever"><h1>Expected</h1></div></body></html>"#;

    #[tokio::test]
    async fn test_html_xpath_truth_table() {
        let cases = [
            (r#"//div[@id="whatever"]/h1/text()"#, "Expected", true, true),
            (r#"//div[@id="whatever"]/h1/text()"#, "Other", true, false),
            (r#"//div[@id="whatever"]/h1/text()"#, "Expected", false, false),
            (r#"//div[@id="whatever"]/h1/text()"#, "Other", false, true),
            (r#"//div[@id="missing"]/h1/text()"#, "Expected", true, false),
            (r#"//div[@id="missing"]/h1/text()"#, "Expected", false, true),
        ];

        for (path, value, expected, matched) in cases {
            let checker = HtmlXPathChecker::new("c", path, value, expected).unwrap();
            let outcome = checker.evaluate(&Document::Static(PAGE.as_bytes())).await;
            assert_eq!(outcome.matched, matched, "{path} {value} {expected}");
        }
    }

    #[test]
    fn test_invalid_xpath_is_rejected() {
        assert!(matches!(
            HtmlXPathChecker::new("c", "//div[", "x", true),
            Err(ConfigurationError::InvalidExpression { .. })
        ));
    }

    #[test]
    fn test_missing_path_is_rejected() {
        let def = CheckDefinition {
            name: "c".into(),
            kind: "html_xpath".into(),
            path: None,
            value: "x".into(),
            expected: true,
        };
        assert!(matches!(
            HtmlXPathChecker::from_definition(&def),
            Err(ConfigurationError::MissingOption { .. })
        ));
    }

    #[test]
    fn test_description() {
        let checker = HtmlXPathChecker::new("title", "//h1/text()", "Expected", false).unwrap();
        assert_eq!(checker.to_string(), "title - '//h1/text()' is not 'Expected'");
    }

    #[tokio::test]
    async fn test_rendered_document_uses_serialized_dom() {
        let mut page = MockRenderedPage::new();
        page.expect_html().returning(|| Ok(PAGE.to_string()));

        let checker =
            HtmlXPathChecker::new("c", r#"//div[@id="whatever"]/h1/text()"#, "Expected", true)
                .unwrap();
        let outcome = checker.evaluate(&Document::Rendered(&page)).await;
        assert!(outcome.matched);
    }

    #[tokio::test]
    async fn test_render_failure_is_reported() {
        let mut page = MockRenderedPage::new();
        page.expect_html()
            .returning(|| Err(crate::fetch::RenderError::Browser("gone".into())));

        let checker = HtmlXPathChecker::new("c", "//h1/text()", "x", false).unwrap();
        let outcome = checker.evaluate(&Document::Rendered(&page)).await;
        assert!(!outcome.matched);
        assert!(matches!(outcome.error, Some(CheckerError::Render(_))));
    }
}
