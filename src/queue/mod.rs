//! Background job queue.
//!
//! Ingestion and aggregation runs are executed by a single worker that
//! drains this queue, so overlapping runs against the same project cannot
//! happen. Enqueueing an identical job (same kind and project filter) while
//! one is already queued is a no-op.

mod database;
#[cfg(test)]
mod memory;
pub mod worker;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use database::DatabaseJobQueue;
#[cfg(test)]
pub use memory::MemoryJobQueue;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Queue error: {0}")]
    Internal(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Ingest,
    Aggregate,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Ingest => "INGEST",
            JobKind::Aggregate => "AGGREGATE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INGEST" => Some(JobKind::Ingest),
            "AGGREGATE" => Some(JobKind::Aggregate),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A claimed unit of work.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    /// Restrict the run to one project; None means all projects.
    pub project_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job unless an identical one is already queued. Returns
    /// whether a new job was actually added.
    async fn enqueue(&self, kind: JobKind, project_id: Option<String>) -> QueueResult<bool>;

    /// Claim the oldest queued job, marking it running.
    async fn claim_next(&self) -> QueueResult<Option<Job>>;

    async fn mark_done(&self, id: Uuid) -> QueueResult<()>;

    async fn mark_failed(&self, id: Uuid, error: &str) -> QueueResult<()>;

    async fn queued_len(&self) -> QueueResult<u64>;
}
