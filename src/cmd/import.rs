//! `import`: copies the monitors of the monitor file into the store used by
//! the pipeline roles.

use std::{path::PathBuf, sync::Arc};

use clap::Parser;

use super::{CommandError, notifier_deps};
use crate::{
    checkers::CheckerRegistry,
    config::{AppConfig, load_monitor_file},
    models::MonitorDefinition,
    monitor::MonitorFactory,
    notifiers::NotifierRegistry,
    persistence::{MonitorRepository, PersistenceError, SqliteStateRepository},
};

/// Arguments of the `import` command.
#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// Monitor file to read instead of `<config-dir>/monitors.yaml`.
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Owner recorded for every imported monitor.
    #[arg(long)]
    pub owner: Option<i64>,
}

/// What an import did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    /// Names of the inserted monitors with their new ids.
    pub imported: Vec<(String, i64)>,
    /// Names that were already stored and left untouched.
    pub skipped: Vec<String>,
}

/// Validates every definition, then stores those whose name is not taken.
/// One invalid definition aborts the import before anything is written.
pub async fn import_definitions(
    repository: &dyn MonitorRepository,
    factory: &MonitorFactory,
    definitions: Vec<MonitorDefinition>,
    owner_id: Option<i64>,
) -> Result<ImportSummary, CommandError> {
    for definition in &definitions {
        factory.build(definition.clone())?;
    }

    let mut summary = ImportSummary::default();
    for mut definition in definitions {
        if owner_id.is_some() {
            definition.owner_id = owner_id;
        }
        match repository.save_definition(&definition).await {
            Ok(id) => {
                tracing::info!(monitor = %definition.name, monitor_id = id, "Imported monitor.");
                summary.imported.push((definition.name, id));
            }
            Err(PersistenceError::AlreadyExists(_)) => {
                tracing::info!(monitor = %definition.name, "Monitor already stored, skipping.");
                summary.skipped.push(definition.name);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(summary)
}

/// Imports the monitor file into the configured store.
pub async fn execute(args: ImportArgs, config: &AppConfig) -> Result<ImportSummary, CommandError> {
    let path = args.file.unwrap_or_else(|| config.monitor_config_path.clone());
    let definitions = load_monitor_file(path)?;

    let repository = Arc::new(SqliteStateRepository::new(&config.database_url).await?);
    repository.run_migrations().await?;
    let deps = notifier_deps(config).await?.with_log_store(repository.clone());
    let factory = MonitorFactory::new(CheckerRegistry::default(), NotifierRegistry::new(deps));

    let summary =
        import_definitions(repository.as_ref(), &factory, definitions, args.owner).await;
    repository.close().await;
    let summary = summary?;
    tracing::info!(
        imported = summary.imported.len(),
        skipped = summary.skipped.len(),
        "Import finished."
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ConfigurationError,
        models::CheckDefinition,
        persistence::sqlite::tests::setup_test_db,
        test_helpers::{MonitorDefinitionBuilder, create_test_factory},
    };

    #[tokio::test]
    async fn test_import_skips_existing_names() {
        let repo = setup_test_db().await;
        let factory = create_test_factory();
        let defs = vec![
            MonitorDefinitionBuilder::new("Shop").build(),
            MonitorDefinitionBuilder::new("Api").build(),
        ];

        let first = import_definitions(&repo, &factory, defs.clone(), Some(4)).await.unwrap();
        let second = import_definitions(&repo, &factory, defs, None).await.unwrap();

        assert_eq!(first.imported.len(), 2);
        assert_eq!(second.skipped, vec!["Shop".to_string(), "Api".to_string()]);
        assert_eq!(repo.definitions_by_owner(4).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_monitor_aborts_import() {
        let repo = setup_test_db().await;
        let defs = vec![
            MonitorDefinitionBuilder::new("Shop").build(),
            MonitorDefinitionBuilder::new("Broken")
                .check(CheckDefinition {
                    name: "c".into(),
                    kind: "regex".into(),
                    path: None,
                    value: "[".into(),
                    expected: true,
                })
                .build(),
        ];

        let result = import_definitions(&repo, &create_test_factory(), defs, None).await;

        assert!(matches!(
            result,
            Err(CommandError::InvalidMonitor(ConfigurationError::InvalidExpression { .. }))
        ));
        assert!(repo.definitions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execute_reads_monitor_file() {
        let dir = tempfile::tempdir().unwrap();
        let monitors = dir.path().join("monitors.yaml");
        std::fs::write(
            &monitors,
            r#"
monitors:
  - name: Shop
    url: https://shop.example.com/p/1
    schedule: { interval: 5m }
    checks:
      - { name: stock, type: regex, expected: "In stock" }
"#,
        )
        .unwrap();
        let config = AppConfig {
            database_url: format!("sqlite:{}", dir.path().join("store.db").display()),
            ..Default::default()
        };

        let summary =
            execute(ImportArgs { file: Some(monitors), owner: None }, &config).await.unwrap();

        assert_eq!(summary.imported.len(), 1);
        assert_eq!(summary.imported[0].0, "Shop");
    }
}
