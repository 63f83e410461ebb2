//! Outcomes of a single monitor run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The outcome of one content checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// The stable type tag of the checker that produced this result.
    pub checker_type: String,

    /// Human-readable description of the checker, e.g.
    /// `"price - '//span/text()' is '9.99'"`.
    pub description: String,

    /// Whether the checker passed.
    pub matched: bool,

    /// The error hit while evaluating, if any.
    pub error: Option<String>,
}

impl CheckResult {
    /// Creates a new result.
    pub fn new(
        checker_type: impl Into<String>,
        description: impl Into<String>,
        matched: bool,
        error: Option<String>,
    ) -> Self {
        Self { checker_type: checker_type.into(), description: description.into(), matched, error }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (err: {})",
            self.description,
            self.matched,
            self.error.as_deref().unwrap_or("none")
        )
    }
}

/// How individual results fold into the monitor's pass/fail state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Every checker must pass.
    #[default]
    AllMustPass,
    /// At least one checker must pass.
    AnyMayPass,
}

impl Aggregation {
    /// Maps the `require_some` flag of a monitor to its combinator.
    pub fn from_require_some(require_some: bool) -> Self {
        if require_some { Aggregation::AnyMayPass } else { Aggregation::AllMustPass }
    }
}

/// The ordered results of one run together with the combinator that decides
/// the aggregate state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    results: Vec<CheckResult>,
    aggregation: Aggregation,
}

impl ResultSet {
    /// Creates an empty set using the given combinator.
    pub fn new(aggregation: Aggregation) -> Self {
        Self { results: Vec::new(), aggregation }
    }

    /// Creates a set from existing results.
    pub fn from_results(aggregation: Aggregation, results: Vec<CheckResult>) -> Self {
        Self { results, aggregation }
    }

    /// Appends a result, keeping insertion order.
    pub fn push(&mut self, result: CheckResult) {
        self.results.push(result);
    }

    /// The individual results in checker order.
    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    /// The combinator used by [`ResultSet::matched`].
    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// True when every result matched. An empty set is true.
    pub fn all_true(&self) -> bool {
        self.results.iter().all(|r| r.matched)
    }

    /// True when at least one result matched. An empty set is false.
    pub fn some_true(&self) -> bool {
        self.results.iter().any(|r| r.matched)
    }

    /// The aggregate state according to the configured combinator.
    pub fn matched(&self) -> bool {
        match self.aggregation {
            Aggregation::AllMustPass => self.all_true(),
            Aggregation::AnyMayPass => self.some_true(),
        }
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the set has no results.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(matched: bool) -> CheckResult {
        CheckResult::new("RegexChecker", "r", matched, None)
    }

    fn set(aggregation: Aggregation, matched: &[bool]) -> ResultSet {
        ResultSet::from_results(aggregation, matched.iter().copied().map(result).collect())
    }

    #[test]
    fn test_empty_set_combinators() {
        let empty = ResultSet::default();
        assert!(empty.all_true());
        assert!(!empty.some_true());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_all_true_and_some_true() {
        let cases: [(&[bool], bool, bool); 4] = [
            (&[true], true, true),
            (&[false], false, false),
            (&[true, false, true], false, true),
            (&[true, true, true], true, true),
        ];
        for (matched, all, some) in cases {
            let s = set(Aggregation::AllMustPass, matched);
            assert_eq!(s.all_true(), all, "{matched:?}");
            assert_eq!(s.some_true(), some, "{matched:?}");
        }
    }

    #[test]
    fn test_matched_follows_aggregation() {
        assert!(!set(Aggregation::AllMustPass, &[true, false]).matched());
        assert!(set(Aggregation::AnyMayPass, &[true, false]).matched());
        assert_eq!(Aggregation::from_require_some(true), Aggregation::AnyMayPass);
    }

    #[test]
    fn test_errored_result_still_folds_in() {
        let mut s = ResultSet::new(Aggregation::AnyMayPass);
        s.push(CheckResult::new("JsonPathChecker", "j", false, Some("invalid json".into())));
        s.push(result(true));
        assert!(s.matched());
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_display() {
        let r = CheckResult::new("RegexChecker", "a - 'x' found", false, Some("boom".into()));
        assert_eq!(r.to_string(), "a - 'x' found: false (err: boom)");
        assert_eq!(result(true).to_string(), "r: true (err: none)");
    }
}
