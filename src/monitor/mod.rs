//! Live monitors: the run state machine and hydration from definitions.

mod error;
mod factory;
mod runtime;

pub use error::MonitorError;
pub use factory::MonitorFactory;
pub use runtime::{Monitor, MonitorState, RunReport};
