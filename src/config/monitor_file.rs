//! The `monitors.yaml` format and its `defaults` block.
//!
//! Entries are merged with the defaults here and come out as fully resolved
//! [`MonitorDefinition`]s: headers are the union of both with the monitor's
//! keys winning, every other field takes the first value that is set.

use std::{
    collections::{BTreeMap, HashSet},
    path::PathBuf,
};

use serde::Deserialize;
use url::Url;

use super::{ConfigLoader, ConfigurationError, LoaderError};
use crate::models::{
    CheckDefinition, MonitorDefinition, MonitorKind, NotifierDefinition, ScheduleConfig,
    ScheduleWindow,
};

const DEFAULT_STATUS_CODE: u16 = 200;

/// Values applied to every monitor that does not set them itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorDefaults {
    /// Fetch strategy.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Headers merged under each monitor's own headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Expected response status.
    #[serde(default)]
    pub expected_status_code: Option<u16>,

    /// Remote browser endpoint for rendered monitors.
    #[serde(default)]
    pub render_server_urn: Option<String>,

    /// Aggregation mode.
    #[serde(default)]
    pub require_some: Option<bool>,

    /// Schedule fields.
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,

    /// Notifiers used by monitors that configure none.
    #[serde(default)]
    pub notifiers: Vec<NotifierDefinition>,
}

/// A content check as written in the file.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckEntry {
    /// Name shown in notifications.
    pub name: String,

    /// Checker tag.
    #[serde(rename = "type")]
    pub kind: String,

    /// XPath, JSON path or selector.
    #[serde(default)]
    pub path: Option<String>,

    /// Regex pattern. For other checkers an alias of `path`.
    #[serde(default)]
    pub pattern: Option<String>,

    /// Value (or regex) that must be present.
    #[serde(default)]
    pub expected: Option<String>,

    /// Value (or regex) that must be absent.
    #[serde(default)]
    pub not_expected: Option<String>,
}

impl CheckEntry {
    /// Resolves the entry into a stored definition.
    pub fn into_definition(self) -> Result<CheckDefinition, ConfigurationError> {
        let is_regex = self.kind.eq_ignore_ascii_case("regex");
        let (value, expected) = match (self.expected, self.not_expected) {
            (Some(v), None) => (Some(v), true),
            (None, Some(v)) => (Some(v), false),
            (None, None) if is_regex && self.pattern.is_some() => (None, true),
            _ => return Err(ConfigurationError::AmbiguousExpectation(self.name)),
        };

        if is_regex {
            let pattern = self.pattern.or(value).unwrap_or_default();
            return Ok(CheckDefinition {
                name: self.name,
                kind: self.kind,
                path: None,
                value: pattern,
                expected,
            });
        }

        let path = self.path.or(self.pattern).filter(|p| !p.is_empty()).ok_or_else(|| {
            ConfigurationError::MissingOption {
                component: format!("checker '{}'", self.name),
                option: "path".to_string(),
            }
        })?;
        Ok(CheckDefinition {
            name: self.name,
            kind: self.kind,
            path: Some(path),
            value: value.unwrap_or_default(),
            expected,
        })
    }
}

/// One monitor as written in the file. Every field may be left to defaults
/// except the name.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorEntry {
    /// Unique monitor name.
    pub name: String,

    /// URL to fetch.
    #[serde(default)]
    pub url: Option<String>,

    /// URL shown in notifications.
    #[serde(default)]
    pub display_url: Option<String>,

    /// Fetch strategy.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Expected response status.
    #[serde(default)]
    pub expected_status_code: Option<u16>,

    /// Remote browser endpoint.
    #[serde(default)]
    pub render_server_urn: Option<String>,

    /// Pass when any check passes.
    #[serde(default)]
    pub require_some: Option<bool>,

    /// Content checks.
    #[serde(default)]
    pub checks: Vec<CheckEntry>,

    /// Shorthand for a regex check that must match.
    #[serde(default)]
    pub regex_expected: Option<String>,

    /// Shorthand for a regex check that must not match.
    #[serde(default)]
    pub regex_not_expected: Option<String>,

    /// Notifiers.
    #[serde(default)]
    pub notifiers: Vec<NotifierDefinition>,

    /// Schedule.
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_url(monitor: &str, url: &str) -> Result<Url, ConfigurationError> {
    Url::parse(url).map_err(|e| ConfigurationError::InvalidUrl {
        monitor: monitor.to_string(),
        url: url.to_string(),
        reason: e.to_string(),
    })
}

impl MonitorEntry {
    /// Merges the entry with `defaults` into a complete definition.
    pub fn resolve(self, defaults: &MonitorDefaults) -> Result<MonitorDefinition, ConfigurationError> {
        let name = self.name;

        let (url, display_url) = match (non_empty(self.url), non_empty(self.display_url)) {
            (Some(url), Some(display)) => (url, display),
            (Some(url), None) => (url.clone(), url),
            (None, Some(display)) => (display.clone(), display),
            (None, None) => return Err(ConfigurationError::MissingUrl(name)),
        };
        let url = parse_url(&name, &url)?;
        let display_url = parse_url(&name, &display_url)?;

        let kind = non_empty(self.kind)
            .or_else(|| non_empty(defaults.kind.clone()))
            .map(|k| k.parse::<MonitorKind>())
            .transpose()
            .map_err(|reason| ConfigurationError::InvalidMonitorType {
                monitor: name.clone(),
                reason,
            })?
            .unwrap_or_default();

        let mut headers = defaults.headers.clone();
        headers.extend(self.headers);

        let render_server_urn =
            non_empty(self.render_server_urn).or_else(|| non_empty(defaults.render_server_urn.clone()));
        if kind == MonitorKind::HttpRender && render_server_urn.is_none() {
            return Err(ConfigurationError::MissingRenderServer(name));
        }

        let schedule_config = match (self.schedule, &defaults.schedule) {
            (Some(own), Some(fallback)) => own.or(fallback),
            (Some(own), None) => own,
            (None, Some(fallback)) => fallback.clone(),
            (None, None) => ScheduleConfig::default(),
        };
        if schedule_config.interval.is_none() {
            return Err(ConfigurationError::MissingOption {
                component: format!("monitor '{name}'"),
                option: "schedule.interval".to_string(),
            });
        }
        let schedule = ScheduleWindow::try_from(schedule_config)
            .map_err(|source| ConfigurationError::InvalidSchedule { monitor: name.clone(), source })?;

        let mut checks =
            self.checks.into_iter().map(CheckEntry::into_definition).collect::<Result<Vec<_>, _>>()?;
        for (value, expected) in [(self.regex_expected, true), (self.regex_not_expected, false)] {
            if let Some(value) = non_empty(value) {
                checks.push(CheckDefinition {
                    name: if expected { "regex expected" } else { "regex not expected" }.to_string(),
                    kind: "regex".to_string(),
                    path: None,
                    value,
                    expected,
                });
            }
        }

        let notifiers =
            if self.notifiers.is_empty() { defaults.notifiers.clone() } else { self.notifiers };

        Ok(MonitorDefinition {
            id: 0,
            owner_id: None,
            name,
            url,
            display_url,
            kind,
            headers,
            expected_status_code: self
                .expected_status_code
                .or(defaults.expected_status_code)
                .unwrap_or(DEFAULT_STATUS_CODE),
            render_server_urn,
            require_some: self.require_some.or(defaults.require_some).unwrap_or(false),
            checks,
            notifiers,
            schedule,
            last_seen_state: false,
        })
    }
}

/// Loads and resolves every monitor of a monitors file.
pub fn load_monitor_file(path: PathBuf) -> Result<Vec<MonitorDefinition>, LoaderError> {
    let loader = ConfigLoader::new(path);
    let defaults: MonitorDefaults = loader.load_optional("defaults")?.unwrap_or_default();
    let entries: Vec<MonitorEntry> = loader.load("monitors")?;

    let mut seen = HashSet::new();
    let mut definitions = Vec::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.name.clone()) {
            return Err(ConfigurationError::DuplicateMonitor(entry.name).into());
        }
        definitions.push(entry.resolve(&defaults)?);
    }

    tracing::debug!(count = definitions.len(), "Resolved monitor definitions.");
    Ok(definitions)
}
