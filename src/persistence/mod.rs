//! Storage of monitor definitions, notifier configurations and the check log.

pub mod error;
pub mod sqlite;
pub mod traits;

pub use error::PersistenceError;
pub use sqlite::SqliteStateRepository;
#[cfg(test)]
pub use traits::{MockCheckLogStore, MockMonitorRepository, MockNotifierRepository};
pub use traits::{CheckLogStore, MonitorRepository, NotifierRepository};
