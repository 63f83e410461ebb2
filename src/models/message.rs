//! Messages exchanged between the scheduler, worker and notifier roles.
//!
//! The JSON field names are a wire contract and must not change.

use serde::{Deserialize, Serialize};

use super::result::{Aggregation, CheckResult, ResultSet};

/// Asks a worker to check one monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleJob {
    /// Identity of the monitor in the shared store.
    pub monitor_id: i64,

    /// Monitor name, for logging.
    pub name: String,

    /// Job kind. Workers only handle [`ScheduleJob::MONITOR`].
    #[serde(rename = "type")]
    pub kind: String,
}

impl ScheduleJob {
    /// The job kind for monitor checks.
    pub const MONITOR: &'static str = "monitor";

    /// Creates a monitor check job.
    pub fn monitor(monitor_id: i64, name: impl Into<String>) -> Self {
        Self { monitor_id, name: name.into(), kind: Self::MONITOR.to_string() }
    }
}

/// One checker outcome on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Checker type tag.
    #[serde(rename = "type")]
    pub kind: String,

    /// Checker description.
    pub message: String,

    /// Whether the checker passed.
    pub result: bool,

    /// Evaluation error, `null` when there was none.
    pub err: Option<String>,
}

/// The outcome of a worker run, consumed by the notifier role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlResult {
    /// Identity of the monitor in the shared store.
    pub monitor_id: i64,

    /// Monitor name.
    pub name: String,

    /// Kind of the job that produced this result.
    #[serde(rename = "type")]
    pub kind: String,

    /// Individual checker outcomes.
    pub results: Vec<ResultEntry>,

    /// The aggregate state of the run.
    pub result: bool,
}

impl CrawlResult {
    /// Builds the wire message for a finished job.
    pub fn from_results(job: &ScheduleJob, results: &ResultSet) -> Self {
        Self {
            monitor_id: job.monitor_id,
            name: job.name.clone(),
            kind: job.kind.clone(),
            results: results
                .results()
                .iter()
                .map(|r| ResultEntry {
                    kind: r.checker_type.clone(),
                    message: r.description.clone(),
                    result: r.matched,
                    err: r.error.clone(),
                })
                .collect(),
            result: results.matched(),
        }
    }

    /// Rebuilds a result set so notifiers can render it.
    pub fn to_result_set(&self, aggregation: Aggregation) -> ResultSet {
        ResultSet::from_results(
            aggregation,
            self.results
                .iter()
                .map(|e| CheckResult::new(&e.kind, &e.message, e.result, e.err.clone()))
                .collect(),
        )
    }
}
