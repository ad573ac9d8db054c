//! Batch engines: export file ingestion and cost aggregation.

pub mod aggregation;
pub mod ingestion;

use std::sync::Arc;

use thiserror::Error;

use crate::{
    cur::ParseError,
    db::{DbPool, error::DbError},
    queue::{JobQueue, QueueError},
    secrets::{SecretError, SecretManager},
    storage::{ReportStoreError, ReportStoreProvider},
};

pub use aggregation::{AggregationOutcome, run_aggregation};
pub use ingestion::{IngestionOutcome, run_ingestion};

/// Everything a batch run needs, assembled once at startup.
pub struct BatchContext {
    pub db: Arc<DbPool>,
    pub secrets: Arc<dyn SecretManager>,
    pub stores: Arc<dyn ReportStoreProvider>,
    pub queue: Arc<dyn JobQueue>,
    /// Maximum PENDING files consumed per aggregation run.
    pub pending_limit: i64,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Secret store error: {0}")]
    Secret(#[from] SecretError),

    #[error("Report store error: {0}")]
    Store(#[from] ReportStoreError),

    #[error("Report parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Connection settings not found for project {0}")]
    MissingConnection(String),

    #[error("Credentials not found for project {0}")]
    MissingCredentials(String),

    #[error("No billing period for object {0}")]
    MissingPeriod(String),
}

pub type BatchResult<T> = Result<T, BatchError>;
