use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;

use crate::{
    models::ResultSet,
    notifiers::{Notifier, NotifierError},
};

/// A notifier that records the outcomes it was given.
#[derive(Debug, Clone, Default)]
pub struct CountingNotifier {
    name: String,
    calls: Arc<AtomicUsize>,
    outcomes: Arc<Mutex<Vec<bool>>>,
}

impl CountingNotifier {
    /// Creates a notifier called `name`.
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    /// Number of notifications so far, shared between clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The aggregate outcome of every notification, in order.
    pub fn outcomes(&self) -> Vec<bool> {
        self.outcomes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "counting"
    }

    async fn notify(
        &self,
        _name: &str,
        _display_url: &str,
        results: &ResultSet,
    ) -> Result<(), NotifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes.lock().unwrap_or_else(PoisonError::into_inner).push(results.matched());
        Ok(())
    }
}
