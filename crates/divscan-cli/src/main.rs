use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "divscan")]
#[command(about = "Dividend scanner command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one ingestion sweep over every tracked company and exit.
    Sync,
    /// Apply database migrations against DATABASE_URL.
    Migrate,
    /// Serve the HTTP API, with the cron sweep when DIVSCAN_SCHEDULER_ENABLED is set.
    Serve,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = divscan_sync::run_sweep_once_from_env().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Migrate => {
            let url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set to migrate")?;
            let pool = divscan_storage::connect_pool(&url).await?;
            divscan_storage::run_migrations(&pool).await?;
            info!("migrations applied");
        }
        Commands::Serve => serve().await?,
    }

    Ok(())
}

async fn serve() -> Result<()> {
    let services = divscan_sync::Services::from_env().await?;
    let cron = if services.config.scheduler_enabled {
        Some(services.scheduler.start_cron(&services.config.sweep_cron).await?)
    } else {
        info!("scheduler disabled; set DIVSCAN_SCHEDULER_ENABLED=1 to sweep on a cron");
        None
    };

    let scheduler = services.scheduler.clone();
    divscan_web::serve(services, divscan_web::port_from_env(), async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
        }
        info!("shutdown requested");
    })
    .await?;

    scheduler.shutdown();
    if let Some(mut sched) = cron {
        sched.shutdown().await.context("stopping cron scheduler")?;
    }
    Ok(())
}
