//! Audit trail entries written by the `log` notifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One state transition recorded by the `log` notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckLogEntry {
    /// Monitor name.
    pub name: String,
    /// The monitor's display URL.
    pub display_url: String,
    /// The aggregate outcome that was notified.
    pub matches_checks: bool,
    /// When the transition was recorded.
    pub created_at: DateTime<Utc>,
}
