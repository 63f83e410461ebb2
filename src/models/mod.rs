//! Core value types shared across the crate.

pub mod check_log;
pub mod definition;
pub mod message;
pub mod result;
pub mod schedule;

pub use check_log::CheckLogEntry;
pub use definition::{CheckDefinition, MonitorDefinition, MonitorKind, NotifierDefinition};
pub use message::{CrawlResult, ResultEntry, ScheduleJob};
pub use result::{Aggregation, CheckResult, ResultSet};
pub use schedule::{IntervalSpec, ScheduleConfig, ScheduleError, ScheduleWindow};
