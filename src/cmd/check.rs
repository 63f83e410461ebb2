//! `check`: evaluates one monitor once and prints the outcome, without
//! notifying anyone.

use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

use super::{CommandError, notifier_deps};
use crate::{
    checkers::CheckerRegistry,
    config::{AppConfig, load_monitor_file},
    fetch::FetcherSet,
    models::{CrawlResult, MonitorDefinition, ResultEntry, ScheduleJob},
    monitor::MonitorFactory,
    notifiers::NotifierRegistry,
};

/// Arguments of the `check` command.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Name of the monitor to check.
    #[arg(short, long)]
    pub monitor: String,

    /// Monitor file to read instead of `<config-dir>/monitors.yaml`.
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

/// The printed outcome of a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    /// Monitor name.
    pub name: String,
    /// The monitor's display URL.
    pub display_url: String,
    /// The aggregate outcome.
    pub matched: bool,
    /// Every checker outcome in order.
    pub results: Vec<ResultEntry>,
}

/// Runs the checks of monitor `name` among `definitions`. Notifiers are
/// neither built nor called.
pub async fn check_monitor(
    definitions: Vec<MonitorDefinition>,
    name: &str,
    factory: &MonitorFactory,
    fetchers: &FetcherSet,
) -> Result<CheckReport, CommandError> {
    let mut definition = definitions
        .into_iter()
        .find(|def| def.name == name)
        .ok_or_else(|| CommandError::UnknownMonitor(name.to_string()))?;
    definition.notifiers.clear();

    let monitor = factory.build(definition)?;
    let results = monitor.execute(fetchers).await?;
    let wire = CrawlResult::from_results(&ScheduleJob::monitor(monitor.id(), monitor.name()), &results);

    Ok(CheckReport {
        name: wire.name,
        display_url: monitor.display_url().to_string(),
        matched: wire.result,
        results: wire.results,
    })
}

/// Runs one monitor from the monitor file and prints its report.
pub async fn execute(args: CheckArgs, config: &AppConfig) -> Result<(), CommandError> {
    let path = args.file.unwrap_or_else(|| config.monitor_config_path.clone());
    let definitions = load_monitor_file(path)?;
    let factory = MonitorFactory::new(
        CheckerRegistry::default(),
        NotifierRegistry::empty(notifier_deps(config).await?),
    );
    let fetchers = FetcherSet::from_config(config)?;

    let report = check_monitor(definitions, &args.monitor, &factory, &fetchers).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
