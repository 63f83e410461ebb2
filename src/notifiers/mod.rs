//! Delivery of state-change alerts.
//!
//! A [`Notifier`] receives the monitor name, its display URL and the
//! [`ResultSet`] of the run that flipped the monitor's state. Notifiers are
//! built from [`NotifierDefinition`](crate::models::NotifierDefinition)s
//! through the [`NotifierRegistry`].

mod error;
mod log_store;
mod pushsafer;
mod registry;
mod slack;
mod webhook;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

pub use error::NotifierError;
pub use log_store::LogStoreNotifier;
pub use pushsafer::PushSaferNotifier;
pub use registry::{NotifierConstructor, NotifierDeps, NotifierRegistry};
pub use slack::SlackNotifier;
pub use webhook::WebhookNotifier;

use crate::models::ResultSet;

/// A sink for state-change alerts.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    /// The configured name.
    fn name(&self) -> &str;

    /// The registry tag of the notifier type.
    fn kind(&self) -> &'static str;

    /// Delivers one alert.
    async fn notify(
        &self,
        name: &str,
        display_url: &str,
        results: &ResultSet,
    ) -> Result<(), NotifierError>;
}

/// The headline of an alert.
pub fn summary_line(name: &str, display_url: &str, results: &ResultSet) -> String {
    if results.matched() {
        format!("<{display_url}|{name}> *matches* checks!")
    } else {
        format!("{name} does *not* match checks!")
    }
}

/// One line per checker, in checker order.
pub fn result_lines(results: &ResultSet) -> impl Iterator<Item = String> + '_ {
    results.results().iter().map(ToString::to_string)
}

/// Invokes every notifier in order. Failures are logged and never stop the
/// remaining notifiers. Returns the number of failed deliveries.
pub async fn fan_out(
    notifiers: &[Arc<dyn Notifier>],
    name: &str,
    display_url: &str,
    results: &ResultSet,
) -> usize {
    let mut failed = 0;
    for notifier in notifiers {
        tracing::debug!(notifier = notifier.name(), monitor = name, "Sending notification.");
        if let Err(e) = notifier.notify(name, display_url, results).await {
            failed += 1;
            tracing::warn!(
                notifier = notifier.name(),
                kind = notifier.kind(),
                monitor = name,
                error = %e,
                "Notification failed."
            );
        }
    }
    failed
}
