#![warn(missing_docs)]
//! Sitewatch watches web pages and JSON endpoints on a schedule, evaluates
//! content checks against what it fetched, and notifies when the combined
//! outcome changes.

pub mod checkers;
pub mod cmd;
pub mod config;
pub mod fetch;
pub mod http_client;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod notifiers;
pub mod persistence;
pub mod pipeline;
pub mod queue;
pub mod supervisor;
pub mod test_helpers;
