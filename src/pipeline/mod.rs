//! The roles that move monitors from "due" to "notified".
//!
//! In pipeline mode three roles talk through a [`MessageBroker`]:
//! the [`Scheduler`] publishes jobs, [`Worker`]s run them and publish
//! results, and the [`NotificationDispatcher`] notifies on state changes.
//! In single-binary mode the [`Runner`] does all of it in one process.
//!
//! [`MessageBroker`]: crate::queue::MessageBroker

mod error;
mod notifier;
mod runner;
mod scheduler;
mod worker;

pub use error::PipelineError;
pub use notifier::{DispatchOutcome, NotificationDispatcher};
pub use runner::Runner;
pub use scheduler::Scheduler;
pub use worker::{JobOutcome, Worker};
