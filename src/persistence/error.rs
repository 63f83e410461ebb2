//! Errors of the monitor store.

use thiserror::Error;

/// Failures of the monitor, notifier and check log repositories.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The database rejected or failed a query.
    #[error("Monitor store operation failed: {0}")]
    OperationFailed(String),

    /// No row has the requested id.
    #[error("Not found in the monitor store: {0}")]
    NotFound(String),

    /// A stored JSON column could not be read or written.
    #[error("Stored column could not be (de)serialized: {0}")]
    SerializationError(String),

    /// The embedded migrations could not be applied.
    #[error("Monitor store migration failed: {0}")]
    MigrationError(String),

    /// A database URL or stored row is unusable.
    #[error("Invalid monitor store input: {0}")]
    InvalidInput(String),

    /// A monitor with the same name is already stored.
    #[error("Already stored: {0}")]
    AlreadyExists(String),
}
