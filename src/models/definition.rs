//! Plain, fully-defaulted descriptions of monitors, checks and notifiers.
//!
//! Definitions are what configuration files and the database produce. The
//! `MonitorFactory` turns them into live components.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use url::Url;

use super::{result::Aggregation, schedule::ScheduleWindow};

/// How a monitor retrieves its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorKind {
    /// A plain HTTP GET of the raw document.
    #[default]
    Http,
    /// The page rendered by a remote headless browser.
    HttpRender,
}

impl MonitorKind {
    /// The storage tag of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorKind::Http => "http",
            MonitorKind::HttpRender => "http_render",
        }
    }
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "http" => Ok(MonitorKind::Http),
            "http_render" => Ok(MonitorKind::HttpRender),
            other => Err(format!("unknown monitor type '{other}'")),
        }
    }
}

/// A content check as stored and configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDefinition {
    /// Name shown in notifications.
    pub name: String,

    /// Registry tag of the checker (`regex`, `html_xpath`, ...).
    #[serde(rename = "type")]
    pub kind: String,

    /// XPath, JSON path or CSS selector. Unused by regex checks.
    #[serde(default)]
    pub path: Option<String>,

    /// The pattern (regex) or the expected node text (all others).
    pub value: String,

    /// Whether the predicate holding means "pass".
    pub expected: bool,
}

/// A notifier as stored and configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierDefinition {
    /// Name of the notifier.
    pub name: String,

    /// Registry tag of the notifier (`slack`, `pushsafer`, ...).
    #[serde(rename = "type")]
    pub kind: String,

    /// Type specific options such as `webhook` or `private_key`.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Everything needed to build a live monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorDefinition {
    /// Identity in the shared store, 0 when not persisted.
    #[serde(default)]
    pub id: i64,

    /// Owner of the monitor, if any.
    #[serde(default)]
    pub owner_id: Option<i64>,

    /// Unique name.
    pub name: String,

    /// The URL that is fetched.
    pub url: Url,

    /// The URL shown in notifications and used for the Referer.
    pub display_url: Url,

    /// Fetch strategy.
    #[serde(rename = "type", default)]
    pub kind: MonitorKind,

    /// Request headers, keys kept as configured.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// The only acceptable response status.
    pub expected_status_code: u16,

    /// Endpoint of the remote browser for `http_render` monitors.
    #[serde(default)]
    pub render_server_urn: Option<String>,

    /// Pass when any check passes instead of all of them.
    #[serde(default)]
    pub require_some: bool,

    /// Content checks in evaluation order.
    #[serde(default)]
    pub checks: Vec<CheckDefinition>,

    /// Notifiers in dispatch order.
    #[serde(default)]
    pub notifiers: Vec<NotifierDefinition>,

    /// When to check.
    pub schedule: ScheduleWindow,

    /// The last aggregate state that was notified.
    #[serde(default)]
    pub last_seen_state: bool,
}

impl MonitorDefinition {
    /// The combinator selected by `require_some`.
    pub fn aggregation(&self) -> Aggregation {
        Aggregation::from_require_some(self.require_some)
    }

    /// The request headers with `Referer` defaulted to the origin of the
    /// display URL. An existing Referer in any letter case is kept.
    pub fn request_headers(&self) -> BTreeMap<String, String> {
        let mut headers = self.headers.clone();
        if !headers.keys().any(|k| k.eq_ignore_ascii_case("referer")) {
            let origin = self.display_url.origin();
            if origin.is_tuple() {
                headers.insert("Referer".to_string(), format!("{}/", origin.ascii_serialization()));
            }
        }
        headers
    }
}
