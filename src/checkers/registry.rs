use std::{collections::HashMap, sync::Arc};

use super::{
    ContentChecker, HtmlXPathChecker, JsonPathChecker, RegexChecker, RenderedSelectorChecker,
};
use crate::{config::ConfigurationError, models::CheckDefinition};

/// Builds a checker from its definition.
pub type CheckerConstructor =
    fn(&CheckDefinition) -> Result<Arc<dyn ContentChecker>, ConfigurationError>;

/// Maps checker type tags to constructors.
///
/// Tags are matched case-insensitively and ignore underscores, so
/// `html_xpath`, `HtmlXPath` and `htmlxpath` name the same checker.
#[derive(Clone)]
pub struct CheckerRegistry {
    constructors: HashMap<String, CheckerConstructor>,
}

fn normalize(tag: &str) -> String {
    tag.chars().filter(|c| *c != '_').flat_map(char::to_lowercase).collect()
}

impl CheckerRegistry {
    /// A registry with no checkers.
    pub fn empty() -> Self {
        Self { constructors: HashMap::new() }
    }

    /// Registers a constructor under a tag, replacing any previous one.
    pub fn register(&mut self, tag: &str, constructor: CheckerConstructor) {
        self.constructors.insert(normalize(tag), constructor);
    }

    /// Whether a constructor exists for the tag.
    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(&normalize(tag))
    }

    /// Builds a checker, failing for unknown tags or invalid expressions.
    pub fn build(&self, def: &CheckDefinition) -> Result<Arc<dyn ContentChecker>, ConfigurationError> {
        let constructor = self
            .constructors
            .get(&normalize(&def.kind))
            .ok_or_else(|| ConfigurationError::UnknownCheckerType(def.kind.clone()))?;
        constructor(def)
    }
}

impl Default for CheckerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("regex", |def| Ok(Arc::new(RegexChecker::from_definition(def)?)));
        registry.register("html_xpath", |def| Ok(Arc::new(HtmlXPathChecker::from_definition(def)?)));
        registry.register("json_path", |def| Ok(Arc::new(JsonPathChecker::from_definition(def)?)));
        registry.register("html_render", |def| {
            Ok(Arc::new(RenderedSelectorChecker::from_definition(def)?))
        });
        registry.register("html_render_selector", |def| {
            Ok(Arc::new(RenderedSelectorChecker::from_definition(def)?))
        });
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(kind: &str, path: Option<&str>) -> CheckDefinition {
        CheckDefinition {
            name: "c".into(),
            kind: kind.into(),
            path: path.map(String::from),
            value: "v".into(),
            expected: true,
        }
    }

    #[test]
    fn test_default_registry_builds_every_type() {
        let registry = CheckerRegistry::default();
        let cases = [
            ("regex", None, "RegexChecker"),
            ("html_xpath", Some("//h1"), "HtmlXPathChecker"),
            ("HtmlXPath", Some("//h1"), "HtmlXPathChecker"),
            ("json_path", Some("//a"), "JsonPathChecker"),
            ("html_render", Some("#a"), "HtmlRenderSelectorChecker"),
            ("HtmlRenderSelector", Some("#a"), "HtmlRenderSelectorChecker"),
        ];
        for (kind, path, expected) in cases {
            let checker = registry.build(&def(kind, path)).unwrap();
            assert_eq!(checker.kind(), expected, "{kind}");
        }
    }

    #[test]
    fn test_unknown_type() {
        let registry = CheckerRegistry::default();
        assert!(matches!(
            registry.build(&def("css", Some("#a"))),
            Err(ConfigurationError::UnknownCheckerType(kind)) if kind == "css"
        ));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = CheckerRegistry::empty();
        assert!(!registry.contains("regex"));
        registry.register("Pattern", |def| Ok(Arc::new(RegexChecker::from_definition(def)?)));
        assert!(registry.contains("pattern"));
        assert!(registry.build(&def("pattern", None)).is_ok());
    }
}
