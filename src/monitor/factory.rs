use std::sync::Arc;

use super::Monitor;
use crate::{
    checkers::{CheckerRegistry, ContentChecker},
    config::ConfigurationError,
    models::{MonitorDefinition, MonitorKind},
    notifiers::NotifierRegistry,
};

/// Turns definitions into live monitors.
#[derive(Clone)]
pub struct MonitorFactory {
    checkers: CheckerRegistry,
    notifiers: NotifierRegistry,
}

impl MonitorFactory {
    /// Creates a factory over both registries.
    pub fn new(checkers: CheckerRegistry, notifiers: NotifierRegistry) -> Self {
        Self { checkers, notifiers }
    }

    /// The registry used to build checkers.
    pub fn checker_registry(&self) -> &CheckerRegistry {
        &self.checkers
    }

    /// The registry used to build notifiers.
    pub fn notifier_registry(&self) -> &NotifierRegistry {
        &self.notifiers
    }

    /// Builds every checker and notifier of `definition`. Any invalid part
    /// rejects the whole monitor.
    pub fn build(&self, definition: MonitorDefinition) -> Result<Monitor, ConfigurationError> {
        if definition.kind == MonitorKind::HttpRender
            && definition.render_server_urn.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigurationError::MissingRenderServer(definition.name));
        }

        let checkers = definition
            .checks
            .iter()
            .map(|check| self.checkers.build(check))
            .collect::<Result<Vec<Arc<dyn ContentChecker>>, _>>()?;
        let notifiers = self.notifiers.build_all(&definition.notifiers)?;

        Ok(Monitor::new(definition, checkers, notifiers))
    }

    /// Builds every definition, logging and skipping the invalid ones.
    pub fn build_valid(&self, definitions: Vec<MonitorDefinition>) -> Vec<Arc<Monitor>> {
        definitions
            .into_iter()
            .filter_map(|definition| {
                let name = definition.name.clone();
                match self.build(definition) {
                    Ok(monitor) => Some(Arc::new(monitor)),
                    Err(e) => {
                        tracing::error!(monitor = %name, error = %e, "Skipping invalid monitor.");
                        None
                    }
                }
            })
            .collect()
    }
}
