use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use costpipe::{
    batch::{self, BatchContext},
    config::{AppConfig, SecretsBackend},
    db::DbPool,
    queue::{DatabaseJobQueue, worker},
    secrets::{EnvSecretManager, SecretManager, SsmParameterStore, SsmParameterStoreConfig},
    storage::S3StoreProvider,
};

#[derive(Parser)]
#[command(name = "costpipe", version, about = "Billing export ingestion and cost aggregation")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "costpipe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon: periodic ingestion plus the job worker.
    Run,
    /// Run one ingestion pass and exit.
    Ingest {
        /// Restrict the run to one project.
        #[arg(long)]
        project: Option<String>,
    },
    /// Run one aggregation pass and exit.
    Aggregate {
        /// Restrict the run to one project.
        #[arg(long)]
        project: Option<String>,
    },
    /// Apply database migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config(&args.config);
    costpipe::observability::init_tracing(&config.logging);

    match args.command {
        Some(Command::Ingest { project }) => {
            let ctx = build_context(&config).await;
            match batch::run_ingestion(&ctx, project.as_deref()).await {
                Ok(outcome) => info!(?outcome, "Ingestion finished"),
                Err(e) => {
                    error!(error = %e, "Ingestion failed");
                    std::process::exit(1);
                }
            }
        }
        Some(Command::Aggregate { project }) => {
            let ctx = build_context(&config).await;
            match batch::run_aggregation(&ctx, project.as_deref()).await {
                Ok(outcome) => info!(?outcome, "Aggregation finished"),
                Err(e) => {
                    error!(error = %e, "Aggregation failed");
                    std::process::exit(1);
                }
            }
        }
        Some(Command::Migrate) => {
            let db = connect_db(&config).await;
            if let Err(e) = db.run_migrations().await {
                error!(error = %e, "Migration failed");
                std::process::exit(1);
            }
            info!("Migrations applied");
        }
        Some(Command::Run) | None => run_daemon(&config).await,
    }
}

fn load_config(path: &PathBuf) -> AppConfig {
    if !path.exists() {
        return AppConfig::default();
    }
    match AppConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

async fn connect_db(config: &AppConfig) -> Arc<DbPool> {
    match DbPool::connect(&config.database).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!(error = %e, url = %config.database.url, "Failed to connect to database");
            std::process::exit(1);
        }
    }
}

async fn build_context(config: &AppConfig) -> BatchContext {
    let db = connect_db(config).await;
    if let Err(e) = db.run_migrations().await {
        error!(error = %e, "Migration failed");
        std::process::exit(1);
    }

    let secrets: Arc<dyn SecretManager> = match config.aws.secrets_backend {
        SecretsBackend::Ssm => {
            let mut ssm_config = SsmParameterStoreConfig::new(&config.aws.region);
            if let Some(prefix) = &config.aws.parameter_prefix {
                ssm_config = ssm_config.with_prefix(prefix);
            }
            if let Some(endpoint_url) = &config.aws.endpoint_url {
                ssm_config = ssm_config.with_endpoint_url(endpoint_url);
            }
            match SsmParameterStore::new(ssm_config).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    error!(error = %e, "Failed to build SSM client");
                    std::process::exit(1);
                }
            }
        }
        SecretsBackend::Env => Arc::new(EnvSecretManager::new()),
    };

    let stores = Arc::new(S3StoreProvider::new(
        &config.aws.region,
        config.aws.endpoint_url.clone(),
    ));
    let queue = Arc::new(DatabaseJobQueue::new(db.sqlite().clone()));

    BatchContext {
        db,
        secrets,
        stores,
        queue,
        pending_limit: config.batch.pending_limit,
    }
}

async fn run_daemon(config: &AppConfig) {
    let ctx = Arc::new(build_context(config).await);
    let shutdown = CancellationToken::new();

    let scheduler = worker::start_ingest_scheduler(
        ctx.clone(),
        Duration::from_secs(config.batch.scheduler_interval_secs),
        shutdown.clone(),
    );
    let job_worker = worker::start_job_worker(
        ctx.clone(),
        Duration::from_secs(config.batch.worker_poll_secs),
        shutdown.clone(),
    );

    // Kick off a first discovery immediately rather than waiting a full
    // scheduler interval.
    if let Err(e) = ctx.queue.enqueue(costpipe::queue::JobKind::Ingest, None).await {
        error!(error = %e, "Failed to enqueue initial ingestion job");
    }

    info!("costpipe daemon started");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    info!("Shutting down");
    shutdown.cancel();
    let _ = scheduler.await;
    let _ = job_worker.await;
}
