//! The schedule window: interval, optional jitter and optional day/hour
//! restrictions that together decide when a monitor runs next.
//!
//! Everything here is a pure function of the window parameters and a
//! reference timestamp. Randomness for the jitter is drawn from a caller
//! supplied [`Rng`] so tests can pin it.

use std::{collections::BTreeSet, fmt, str::FromStr, time::Duration};

use chrono::{DateTime, Datelike, Duration as TimeDelta, NaiveTime, TimeZone, Timelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{format_interval, parse_interval};

/// Errors raised while building or parsing a [`ScheduleWindow`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// The interval must be at least one second.
    #[error("Schedule interval must be positive")]
    ZeroInterval,

    /// The interval exceeds [`MAX_INTERVAL`].
    #[error("Schedule interval of {0}s exceeds the maximum of one year")]
    IntervalTooLong(u64),

    /// The jitter percentage must be within 0..=100.
    #[error("Interval variation percentage must be between 0 and 100, got {0}")]
    InvalidJitter(u32),

    /// A weekday outside 0..=6 was configured.
    #[error("Invalid weekday {0}, expected 0 (Sunday) to 6 (Saturday)")]
    InvalidDay(u32),

    /// An hour outside 0..=23 was configured.
    #[error("Invalid hour {0}, expected 0 to 23")]
    InvalidHour(u32),

    /// A day or hour list could not be parsed.
    #[error("Invalid value list '{0}': {1}")]
    InvalidList(String, String),

    /// The interval could not be parsed.
    #[error("Invalid interval '{0}'")]
    InvalidInterval(String),

    /// The compact `interval;jitter;days;hours` form was malformed.
    #[error("Invalid schedule string '{0}': {1}")]
    InvalidFormat(String, String),
}

/// Parses a compact list such as `"1-5"` or `"0,3,5-6"` into a sorted set.
fn parse_list(input: &str, max: u32) -> Result<BTreeSet<u8>, ScheduleError> {
    let mut set = BTreeSet::new();
    let invalid = |reason: String| ScheduleError::InvalidList(input.to_string(), reason);

    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (from, to) = match part.split_once('-') {
            Some((from, to)) => (from.trim(), to.trim()),
            None => (part, part),
        };
        let from: u32 = from.parse().map_err(|e| invalid(format!("'{from}': {e}")))?;
        let to: u32 = to.parse().map_err(|e| invalid(format!("'{to}': {e}")))?;
        if from > to {
            return Err(invalid(format!("range {from}-{to} is reversed")));
        }
        for value in from..=to {
            if value > max {
                return Err(if max == 6 {
                    ScheduleError::InvalidDay(value)
                } else {
                    ScheduleError::InvalidHour(value)
                });
            }
            set.insert(value as u8);
        }
    }

    Ok(set)
}

/// Formats a set back into its canonical comma separated form.
fn format_list(set: &BTreeSet<u8>) -> String {
    set.iter().map(u8::to_string).collect::<Vec<_>>().join(",")
}

fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&t.date_naive().and_time(NaiveTime::MIN))
}

fn start_of_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(t) + TimeDelta::hours(i64::from(t.hour()))
}

/// The longest accepted interval.
pub const MAX_INTERVAL: Duration = Duration::from_secs(366 * 24 * 3600);

/// An immutable rule describing when a monitor should next be checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleConfig", into = "ScheduleConfig")]
pub struct ScheduleWindow {
    interval: Duration,
    jitter_percent: u8,
    days: BTreeSet<u8>,
    hours: BTreeSet<u8>,
}

impl ScheduleWindow {
    /// Creates a new window, validating every parameter.
    pub fn new(
        interval: Duration,
        jitter_percent: u32,
        days: impl IntoIterator<Item = u32>,
        hours: impl IntoIterator<Item = u32>,
    ) -> Result<Self, ScheduleError> {
        if interval.as_secs() == 0 {
            return Err(ScheduleError::ZeroInterval);
        }
        if interval > MAX_INTERVAL {
            return Err(ScheduleError::IntervalTooLong(interval.as_secs()));
        }
        if jitter_percent > 100 {
            return Err(ScheduleError::InvalidJitter(jitter_percent));
        }
        let days = days
            .into_iter()
            .map(|d| if d > 6 { Err(ScheduleError::InvalidDay(d)) } else { Ok(d as u8) })
            .collect::<Result<BTreeSet<_>, _>>()?;
        let hours = hours
            .into_iter()
            .map(|h| if h > 23 { Err(ScheduleError::InvalidHour(h)) } else { Ok(h as u8) })
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Self { interval, jitter_percent: jitter_percent as u8, days, hours })
    }

    /// A window with a fixed interval and no restrictions.
    pub fn every(interval: Duration) -> Result<Self, ScheduleError> {
        Self::new(interval, 0, [], [])
    }

    /// The base interval between two checks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The jitter percentage, 0 meaning no randomization.
    pub fn jitter_percent(&self) -> u8 {
        self.jitter_percent
    }

    /// Allowed weekdays, 0 being Sunday. Empty means every day.
    pub fn days(&self) -> &BTreeSet<u8> {
        &self.days
    }

    /// Allowed hours of the day. Empty means every hour.
    pub fn hours(&self) -> &BTreeSet<u8> {
        &self.hours
    }

    /// Whether `t` falls on an allowed weekday.
    pub fn is_within_days(&self, t: DateTime<Utc>) -> bool {
        self.days.is_empty() || self.days.contains(&(t.weekday().num_days_from_sunday() as u8))
    }

    /// Whether `t` falls inside an allowed hour.
    pub fn is_within_hours(&self, t: DateTime<Utc>) -> bool {
        self.hours.is_empty() || self.hours.contains(&(t.hour() as u8))
    }

    /// Whether `t` satisfies both the day and the hour restrictions.
    pub fn is_within_schedule(&self, t: DateTime<Utc>) -> bool {
        self.is_within_days(t) && self.is_within_hours(t)
    }

    /// Midnight of the first allowed day strictly after the date of `from`.
    pub fn next_day(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let mut to = start_of_day(from) + TimeDelta::days(1);
        // At most a week of searching since at least one weekday is allowed.
        while !self.is_within_days(to) {
            to += TimeDelta::days(1);
        }
        to
    }

    /// The start of the next allowed hour at or after `from`, rolling over to
    /// the next allowed day when `from` is past the last allowed hour.
    pub fn next_hour(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let Some(&last_hour) = self.hours.last() else {
            return from;
        };

        let mut to = from;
        if from.hour() > u32::from(last_hour) {
            to = self.next_day(to);
        }

        if !self.is_within_hours(to) {
            while !self.is_within_hours(to) {
                to += TimeDelta::hours(1);
            }
            to = start_of_hour(to);
        }

        to
    }

    /// The delay until the next check in seconds, drawn from the jitter range.
    pub fn draw_delay_secs<R: Rng>(&self, rng: &mut R) -> i64 {
        let interval = self.interval.as_secs() as i64;
        if self.jitter_percent == 0 {
            return interval;
        }
        let spread = interval * i64::from(self.jitter_percent) / 100;
        rng.gen_range(interval - spread..=interval + spread)
    }

    /// Computes the next check time after `from` using the thread-local RNG.
    pub fn calculate_next_from(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        self.calculate_next_from_with(from, &mut rand::thread_rng())
    }

    /// Computes the next check time after `from` using the given RNG.
    pub fn calculate_next_from_with<R: Rng>(
        &self,
        from: DateTime<Utc>,
        rng: &mut R,
    ) -> DateTime<Utc> {
        let mut to = from + TimeDelta::seconds(self.draw_delay_secs(rng));

        if self.is_within_schedule(to) {
            return to;
        }

        if !self.is_within_days(to) {
            to = self.next_day(to);
        }

        if !self.is_within_hours(to) {
            to = self.next_hour(to);
        }

        to
    }
}

/// Compact `interval_secs;jitter;days;hours` form, e.g. `300;10;1-5;9,10,11`.
impl fmt::Display for ScheduleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{};{}",
            self.interval.as_secs(),
            self.jitter_percent,
            format_list(&self.days),
            format_list(&self.hours)
        )
    }
}

impl FromStr for ScheduleWindow {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(';').collect();
        let [interval, jitter, days, hours] = parts.as_slice() else {
            return Err(ScheduleError::InvalidFormat(
                s.to_string(),
                format!("need 4 parts, {} given", parts.len()),
            ));
        };
        let interval: u64 = interval
            .trim()
            .parse()
            .map_err(|e| ScheduleError::InvalidFormat(s.to_string(), format!("interval: {e}")))?;
        let jitter: u32 = jitter
            .trim()
            .parse()
            .map_err(|e| ScheduleError::InvalidFormat(s.to_string(), format!("variation: {e}")))?;

        Self::new(
            Duration::from_secs(interval),
            jitter,
            parse_list(days, 6)?.into_iter().map(u32::from),
            parse_list(hours, 23)?.into_iter().map(u32::from),
        )
    }
}

/// The configuration-file shape of a schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// `"30s"`, `"5m"`, `"1h30m"` or a bare number of seconds.
    #[serde(default)]
    pub interval: Option<IntervalSpec>,

    /// Optional jitter percentage.
    #[serde(default)]
    pub interval_variation_percentage: Option<u32>,

    /// Allowed weekdays in compact list form.
    #[serde(default, deserialize_with = "deserialize_list_string")]
    pub days: Option<String>,

    /// Allowed hours in compact list form.
    #[serde(default, deserialize_with = "deserialize_list_string")]
    pub hours: Option<String>,
}

/// Accepts `"1-5"` as well as a bare `3` for day and hour lists.
fn deserialize_list_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u64),
        Text(String),
    }

    Ok(Option::<Repr>::deserialize(deserializer)?.map(|repr| match repr {
        Repr::Number(n) => n.to_string(),
        Repr::Text(s) => s,
    }))
}

/// An interval as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntervalSpec {
    /// A plain number of seconds.
    Seconds(u64),
    /// A duration string such as `"1h30m"`.
    Text(String),
}

impl IntervalSpec {
    /// Resolves the interval to a duration.
    pub fn to_duration(&self) -> Result<Duration, ScheduleError> {
        match self {
            IntervalSpec::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            IntervalSpec::Text(text) => {
                parse_interval(text).ok_or_else(|| ScheduleError::InvalidInterval(text.clone()))
            }
        }
    }
}

impl ScheduleConfig {
    /// Field-wise merge where `self` wins over `fallback` when set.
    pub fn or(self, fallback: &ScheduleConfig) -> ScheduleConfig {
        ScheduleConfig {
            interval: self.interval.or_else(|| fallback.interval.clone()),
            interval_variation_percentage: self
                .interval_variation_percentage
                .or(fallback.interval_variation_percentage),
            days: self.days.filter(|d| !d.trim().is_empty()).or_else(|| fallback.days.clone()),
            hours: self.hours.filter(|h| !h.trim().is_empty()).or_else(|| fallback.hours.clone()),
        }
    }
}

impl TryFrom<ScheduleConfig> for ScheduleWindow {
    type Error = ScheduleError;

    fn try_from(config: ScheduleConfig) -> Result<Self, Self::Error> {
        let interval = config.interval.ok_or(ScheduleError::ZeroInterval)?.to_duration()?;
        let days = parse_list(config.days.as_deref().unwrap_or_default(), 6)?;
        let hours = parse_list(config.hours.as_deref().unwrap_or_default(), 23)?;
        ScheduleWindow::new(
            interval,
            config.interval_variation_percentage.unwrap_or(0),
            days.into_iter().map(u32::from),
            hours.into_iter().map(u32::from),
        )
    }
}

impl From<ScheduleWindow> for ScheduleConfig {
    fn from(window: ScheduleWindow) -> Self {
        ScheduleConfig {
            interval: Some(IntervalSpec::Text(format_interval(window.interval))),
            interval_variation_percentage: Some(u32::from(window.jitter_percent)),
            days: Some(format_list(&window.days)).filter(|s| !s.is_empty()),
            hours: Some(format_list(&window.hours)).filter(|s| !s.is_empty()),
        }
    }
}
