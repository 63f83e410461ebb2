use std::sync::Arc;

use clap::{Parser, Subcommand};
use sitewatch::{
    cmd::{CheckArgs, ImportArgs, check, import},
    config::{AppConfig, load_monitor_file},
    persistence::SqliteStateRepository,
    queue::{MessageBroker, RabbitMqBroker},
    supervisor::{Role, Supervisor},
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding `app.yaml` and `monitors.yaml`.
    #[arg(long, global = true, env = "SITEWATCH_CONFIG_DIR")]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs every monitor of the monitor file in this process.
    Run,
    /// Stores the monitors of the monitor file for the pipeline roles.
    Import(ImportArgs),
    /// Publishes due monitors to the schedule queue.
    Scheduler,
    /// Checks scheduled monitors and publishes their results.
    Worker,
    /// Turns results into notifications on state changes.
    Notifier,
    /// Runs scheduler, worker and notifier in one process.
    Pipeline,
    /// Checks one monitor once and prints the outcome.
    Check(CheckArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    tracing::debug!("Loading application configuration...");
    let config = AppConfig::new(cli.config_dir.as_deref())?;
    tracing::debug!(
        database_url = %config.database_url,
        monitors = %config.monitor_config_path.display(),
        "Configuration loaded."
    );

    match cli.command {
        Commands::Run => run_monitors(config).await?,
        Commands::Import(args) => {
            import::execute(args, &config).await?;
        }
        Commands::Scheduler => run_role(config, Role::Scheduler).await?,
        Commands::Worker => run_role(config, Role::Worker).await?,
        Commands::Notifier => run_role(config, Role::Notifier).await?,
        Commands::Pipeline => run_role(config, Role::Pipeline).await?,
        Commands::Check(args) => check::execute(args, &config).await?,
    }

    Ok(())
}

async fn open_state(config: &AppConfig) -> Result<Arc<SqliteStateRepository>, Box<dyn std::error::Error>> {
    tracing::debug!("Initializing state repository...");
    let repo = Arc::new(SqliteStateRepository::new(&config.database_url).await?);
    repo.run_migrations().await?;
    Ok(repo)
}

async fn run_monitors(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let definitions = load_monitor_file(config.monitor_config_path.clone())?;
    tracing::info!(count = definitions.len(), "Monitor file loaded.");

    // The store only backs the `log` notifier here, so a broken database is
    // not fatal.
    let state = match open_state(&config).await {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::warn!(error = %e, "Check log store unavailable. The log notifier is disabled.");
            None
        }
    };

    let mut builder = Supervisor::builder().config(config).role(Role::Run).definitions(definitions);
    if let Some(state) = state {
        builder = builder.state(state);
    }
    let supervisor = builder.build().await?;

    tracing::info!("Supervisor initialized, starting monitoring...");
    supervisor.run().await?;
    Ok(())
}

async fn run_role(config: AppConfig, role: Role) -> Result<(), Box<dyn std::error::Error>> {
    let state = open_state(&config).await?;

    let broker: Option<Arc<dyn MessageBroker>> = match config.amqp_url.as_deref() {
        Some(uri) => {
            tracing::debug!("Connecting to the message broker...");
            Some(Arc::new(RabbitMqBroker::connect(uri).await?))
        }
        None if role == Role::Pipeline => {
            tracing::info!("No amqp_url configured, the pipeline runs over an in-memory broker.");
            None
        }
        None => return Err(format!("amqp_url is required for the {role:?} role").into()),
    };

    let mut builder = Supervisor::builder().config(config).role(role).state(state);
    if let Some(broker) = broker {
        builder = builder.broker(broker);
    }
    let supervisor = builder.build().await?;

    tracing::info!(?role, "Supervisor initialized, starting services...");
    supervisor.run().await?;
    Ok(())
}
