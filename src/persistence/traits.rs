//! Storage seams for monitors, notifiers and the check log.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::PersistenceError;
use crate::{
    models::{CheckLogEntry, MonitorDefinition, NotifierDefinition},
    monitor::{Monitor, MonitorFactory},
    notifiers::{Notifier, NotifierRegistry},
};

fn hydrate(factory: &MonitorFactory, def: MonitorDefinition) -> Result<Monitor, PersistenceError> {
    let name = def.name.clone();
    factory
        .build(def)
        .map_err(|e| PersistenceError::InvalidInput(format!("stored monitor '{name}': {e}")))
}

/// Stored monitors.
///
/// Implementors provide the definition-level operations. The hydrating
/// lookups build live [`Monitor`]s from them through a [`MonitorFactory`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MonitorRepository: Send + Sync {
    /// The definition of monitor `id`, with checks and notifiers attached.
    async fn definition(&self, id: i64) -> Result<MonitorDefinition, PersistenceError>;

    /// Every stored definition, ordered by id.
    async fn definitions(&self) -> Result<Vec<MonitorDefinition>, PersistenceError>;

    /// The definitions belonging to `owner_id`, ordered by id.
    async fn definitions_by_owner(
        &self,
        owner_id: i64,
    ) -> Result<Vec<MonitorDefinition>, PersistenceError>;

    /// Inserts a definition with its checks and notifiers. Returns the new id.
    async fn save_definition(&self, definition: &MonitorDefinition) -> Result<i64, PersistenceError>;

    /// Persists the last notified aggregate state of monitor `id`.
    async fn set_last_seen_state(&self, id: i64, state: bool) -> Result<(), PersistenceError>;

    /// The live monitor `id`.
    async fn find(&self, id: i64, factory: &MonitorFactory) -> Result<Monitor, PersistenceError> {
        hydrate(factory, self.definition(id).await?)
    }

    /// Every live monitor.
    async fn all(&self, factory: &MonitorFactory) -> Result<Vec<Monitor>, PersistenceError> {
        self.definitions().await?.into_iter().map(|def| hydrate(factory, def)).collect()
    }

    /// The live monitors belonging to `owner_id`.
    async fn find_by_owner(
        &self,
        owner_id: i64,
        factory: &MonitorFactory,
    ) -> Result<Vec<Monitor>, PersistenceError> {
        self.definitions_by_owner(owner_id)
            .await?
            .into_iter()
            .map(|def| hydrate(factory, def))
            .collect()
    }
}

/// Stored notifier configurations.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotifierRepository: Send + Sync {
    /// The notifier definitions attached to monitor `monitor_id`, in order.
    async fn notifier_definitions(
        &self,
        monitor_id: i64,
    ) -> Result<Vec<NotifierDefinition>, PersistenceError>;

    /// The live notifiers attached to monitor `monitor_id`.
    async fn find_by_monitor_id(
        &self,
        monitor_id: i64,
        registry: &NotifierRegistry,
    ) -> Result<Vec<Arc<dyn Notifier>>, PersistenceError> {
        let definitions = self.notifier_definitions(monitor_id).await?;
        registry.build_all(&definitions).map_err(|e| {
            PersistenceError::InvalidInput(format!("notifiers of monitor {monitor_id}: {e}"))
        })
    }
}

/// Append-only log of notified state transitions.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CheckLogStore: Send + Sync + fmt::Debug {
    /// Records one entry.
    async fn append(&self, entry: &CheckLogEntry) -> Result<(), PersistenceError>;

    /// The newest `limit` entries, newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<CheckLogEntry>, PersistenceError>;
}
