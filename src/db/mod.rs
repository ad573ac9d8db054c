//! Database access layer.
//!
//! `DbPool` owns the SQLite connection pool and hands out repository trait
//! objects; engines depend only on the traits in [`repos`].

pub mod error;
pub mod repos;
pub mod sqlite;

use std::{str::FromStr, sync::Arc};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use self::{
    error::DbResult,
    repos::{BillingFileRepo, CostReportRepo, ProjectConnectionRepo},
    sqlite::{SqliteBillingFileRepo, SqliteCostReportRepo, SqliteProjectConnectionRepo},
};
use crate::config::DatabaseConfig;

struct CachedRepos {
    billing_files: Arc<dyn BillingFileRepo>,
    project_connections: Arc<dyn ProjectConnectionRepo>,
    cost_reports: Arc<dyn CostReportRepo>,
}

/// Shared database handle with cached repository instances.
pub struct DbPool {
    pool: SqlitePool,
    repos: CachedRepos,
}

impl DbPool {
    /// Connect using the configured database URL, creating the file if it
    /// does not exist yet.
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool (used by tests with in-memory databases).
    pub fn from_pool(pool: SqlitePool) -> Self {
        let repos = CachedRepos {
            billing_files: Arc::new(SqliteBillingFileRepo::new(pool.clone())),
            project_connections: Arc::new(SqliteProjectConnectionRepo::new(pool.clone())),
            cost_reports: Arc::new(SqliteCostReportRepo::new(pool.clone())),
        };

        Self { pool, repos }
    }

    /// Apply embedded migrations.
    pub async fn run_migrations(&self) -> DbResult<()> {
        sqlx::migrate!("./migrations_sqlx/sqlite")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    pub fn billing_files(&self) -> Arc<dyn BillingFileRepo> {
        self.repos.billing_files.clone()
    }

    pub fn project_connections(&self) -> Arc<dyn ProjectConnectionRepo> {
        self.repos.project_connections.clone()
    }

    pub fn cost_reports(&self) -> Arc<dyn CostReportRepo> {
        self.repos.cost_reports.clone()
    }

    /// Raw pool access for subsystems that manage their own tables (job
    /// queue).
    pub fn sqlite(&self) -> &SqlitePool {
        &self.pool
    }
}
