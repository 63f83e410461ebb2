//! A builder for creating `MonitorDefinition` instances in tests.

use std::{collections::BTreeMap, time::Duration};

use url::Url;

use crate::models::{
    CheckDefinition, MonitorDefinition, MonitorKind, NotifierDefinition, ScheduleWindow,
};

/// A builder for creating `MonitorDefinition` instances in tests.
///
/// Defaults: `https://example.com/`, a 60 second interval without jitter or
/// windows, status 200, no checks and no notifiers.
pub struct MonitorDefinitionBuilder {
    id: i64,
    name: String,
    url: Url,
    display_url: Option<Url>,
    kind: MonitorKind,
    headers: BTreeMap<String, String>,
    expected_status_code: u16,
    render_server_urn: Option<String>,
    require_some: bool,
    interval: Duration,
    checks: Vec<CheckDefinition>,
    notifiers: Vec<NotifierDefinition>,
}

impl MonitorDefinitionBuilder {
    /// Creates a new `MonitorDefinitionBuilder` for a monitor called `name`.
    pub fn new(name: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            url: Url::parse("https://example.com/").expect("static URL is valid"),
            display_url: None,
            kind: MonitorKind::Http,
            headers: BTreeMap::new(),
            expected_status_code: 200,
            render_server_urn: None,
            require_some: false,
            interval: Duration::from_secs(60),
            checks: Vec::new(),
            notifiers: Vec::new(),
        }
    }

    /// Sets the ID for the monitor.
    pub fn id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Sets the fetched URL. Panics on an invalid URL.
    pub fn url(mut self, url: &str) -> Self {
        self.url = Url::parse(url).expect("test URL must be valid");
        self
    }

    /// Sets the display URL. Defaults to the fetched URL.
    pub fn display_url(mut self, url: &str) -> Self {
        self.display_url = Some(Url::parse(url).expect("test URL must be valid"));
        self
    }

    /// Sets the fetch strategy.
    pub fn kind(mut self, kind: MonitorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Adds a request header.
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    /// Sets the expected status code.
    pub fn expected_status_code(mut self, status: u16) -> Self {
        self.expected_status_code = status;
        self
    }

    /// Sets the render server endpoint.
    pub fn render_server_urn(mut self, urn: &str) -> Self {
        self.render_server_urn = Some(urn.to_string());
        self
    }

    /// Passes the monitor when any check passes.
    pub fn require_some(mut self, require_some: bool) -> Self {
        self.require_some = require_some;
        self
    }

    /// Sets the check interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Appends a content check.
    pub fn check(mut self, check: CheckDefinition) -> Self {
        self.checks.push(check);
        self
    }

    /// Appends a notifier.
    pub fn notifier(mut self, notifier: NotifierDefinition) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Builds the `MonitorDefinition`. Panics on a zero interval.
    pub fn build(self) -> MonitorDefinition {
        MonitorDefinition {
            id: self.id,
            owner_id: None,
            name: self.name,
            display_url: self.display_url.unwrap_or_else(|| self.url.clone()),
            url: self.url,
            kind: self.kind,
            headers: self.headers,
            expected_status_code: self.expected_status_code,
            render_server_urn: self.render_server_urn,
            require_some: self.require_some,
            checks: self.checks,
            notifiers: self.notifiers,
            schedule: ScheduleWindow::every(self.interval).expect("test interval must be positive"),
            last_seen_state: false,
        }
    }
}
