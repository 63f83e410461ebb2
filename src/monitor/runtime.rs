use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use url::Url;

use super::MonitorError;
use crate::{
    checkers::{ContentChecker, evaluate_all},
    fetch::{FetchRequest, FetcherSet},
    models::{Aggregation, MonitorDefinition, MonitorKind, ResultSet},
    notifiers::{Notifier, fan_out},
};

/// The mutable part of a monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorState {
    /// When the last run finished.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// When the monitor is due again. `None` means now.
    pub next_check_at: Option<DateTime<Utc>>,
    /// A job for this monitor is queued or running.
    pub check_pending: bool,
    /// The last aggregate outcome that was notified.
    pub last_seen_state: bool,
}

/// The outcome of [`Monitor::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Individual checker results.
    pub results: ResultSet,
    /// The aggregate outcome.
    pub matched: bool,
    /// Whether the aggregate differs from the previous run.
    pub state_changed: bool,
    /// Notifiers that failed while fanning out the change.
    pub failed_notifications: usize,
}

/// A monitor with its checkers, notifiers and run state.
///
/// The state sits behind a mutex so the scheduler tick and the run
/// completion can update it from different tasks. A monitor is never
/// dispatched twice: [`Monitor::mark_pending`] refuses while a run is in
/// flight, and every run clears the flag when it ends.
pub struct Monitor {
    definition: MonitorDefinition,
    request: FetchRequest,
    checkers: Vec<Arc<dyn ContentChecker>>,
    notifiers: Vec<Arc<dyn Notifier>>,
    state: Mutex<MonitorState>,
}

/// Stamps the end of a run when dropped, whichever way the run exits.
struct RunGuard<'a> {
    monitor: &'a Monitor,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.monitor.finish_run(Utc::now());
    }
}

impl Monitor {
    /// Assembles a monitor from already built components.
    pub fn new(
        definition: MonitorDefinition,
        checkers: Vec<Arc<dyn ContentChecker>>,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Self {
        let state = MonitorState { last_seen_state: definition.last_seen_state, ..Default::default() };
        Self {
            request: FetchRequest::from_definition(&definition),
            definition,
            checkers,
            notifiers,
            state: Mutex::new(state),
        }
    }

    /// Store id of the monitor.
    pub fn id(&self) -> i64 {
        self.definition.id
    }

    /// Unique display name.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// The URL shown in notifications.
    pub fn display_url(&self) -> &Url {
        &self.definition.display_url
    }

    /// How the page is fetched.
    pub fn kind(&self) -> MonitorKind {
        self.definition.kind
    }

    /// How checker results are combined.
    pub fn aggregation(&self) -> Aggregation {
        self.definition.aggregation()
    }

    /// The definition this monitor was built from.
    pub fn definition(&self) -> &MonitorDefinition {
        &self.definition
    }

    /// Checkers in definition order.
    pub fn checkers(&self) -> &[Arc<dyn ContentChecker>] {
        &self.checkers
    }

    /// Notifiers in attachment order.
    pub fn notifiers(&self) -> &[Arc<dyn Notifier>] {
        &self.notifiers
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        // The state is plain data, a panic while holding the lock cannot
        // leave it half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A snapshot of the run state.
    pub fn state(&self) -> MonitorState {
        *self.lock()
    }

    /// When the monitor is next due, if scheduled.
    pub fn next_check_at(&self) -> Option<DateTime<Utc>> {
        self.lock().next_check_at
    }

    /// The aggregated outcome of the last completed check.
    pub fn last_seen_state(&self) -> bool {
        self.lock().last_seen_state
    }

    /// Whether the monitor is due and not already in flight. Has no side
    /// effects.
    pub fn should_run(&self, now: DateTime<Utc>) -> bool {
        let state = self.lock();
        !state.check_pending && state.next_check_at.is_none_or(|next| next <= now)
    }

    /// Flags the monitor as queued. Returns `false` if it already was.
    pub fn mark_pending(&self) -> bool {
        let mut state = self.lock();
        if state.check_pending {
            return false;
        }
        state.check_pending = true;
        true
    }

    /// Clears the pending flag without touching the schedule, for a dispatch
    /// that never happened.
    pub fn release_pending(&self) {
        self.lock().check_pending = false;
    }

    fn finish_run(&self, now: DateTime<Utc>) {
        let next = self.definition.schedule.calculate_next_from(now);
        let mut state = self.lock();
        state.last_checked_at = Some(now);
        state.next_check_at = Some(next);
        state.check_pending = false;
        tracing::debug!(
            monitor = %self.definition.name,
            next_check_at = %next,
            in_secs = (next - now).num_seconds(),
            "Scheduled next check."
        );
    }

    /// Marks a dispatched job as done from the scheduler's point of view.
    pub fn complete_dispatch(&self, now: DateTime<Utc>) {
        self.finish_run(now);
    }

    /// Carries the run state of `previous` over to this monitor. Used when
    /// definitions are reloaded.
    pub fn adopt_state(&self, previous: &Monitor) {
        let carried = previous.state();
        *self.lock() = carried;
    }

    /// Fetches the target and evaluates every checker.
    ///
    /// The schedule advances and the pending flag clears when this returns,
    /// including when the fetch fails.
    #[tracing::instrument(skip(self, fetchers), fields(monitor = %self.definition.name))]
    pub async fn execute(&self, fetchers: &FetcherSet) -> Result<ResultSet, MonitorError> {
        let _guard = RunGuard { monitor: self };

        let artifact = fetchers
            .for_kind(self.definition.kind)
            .fetch(&self.request)
            .await
            .map_err(|source| MonitorError::Fetch {
                monitor: self.definition.name.clone(),
                source,
            })?;

        let results =
            evaluate_all(&self.checkers, &artifact.as_document(), self.aggregation()).await;
        for result in results.results() {
            tracing::debug!(result = %result, "Checker evaluated.");
        }
        Ok(results)
    }

    /// Records an aggregate outcome. Returns whether it differs from the
    /// last one.
    pub fn observe(&self, matched: bool) -> bool {
        let mut state = self.lock();
        if state.last_seen_state == matched {
            return false;
        }
        state.last_seen_state = matched;
        true
    }

    /// Executes the monitor and notifies every notifier when the aggregate
    /// outcome changed.
    pub async fn run(&self, fetchers: &FetcherSet) -> Result<RunReport, MonitorError> {
        let results = self.execute(fetchers).await?;
        let matched = results.matched();
        let state_changed = self.observe(matched);

        let mut failed_notifications = 0;
        if state_changed {
            tracing::info!(monitor = %self.definition.name, matched, "Monitor state changed.");
            failed_notifications = fan_out(
                &self.notifiers,
                &self.definition.name,
                self.definition.display_url.as_str(),
                &results,
            )
            .await;
        }

        Ok(RunReport { results, matched, state_changed, failed_notifications })
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("id", &self.definition.id)
            .field("name", &self.definition.name)
            .field("kind", &self.definition.kind)
            .field("checkers", &self.checkers.len())
            .field("notifiers", &self.notifiers.len())
            .field("state", &self.state())
            .finish()
    }
}
