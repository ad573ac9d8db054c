//! SQLite-backed job queue.
//!
//! Jobs survive restarts and the claim step is a conditional update, so
//! even with several workers only one can win a given job.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::{Job, JobKind, JobQueue, QueueError, QueueResult};

pub struct DatabaseJobQueue {
    pool: SqlitePool,
}

impl DatabaseJobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for DatabaseJobQueue {
    async fn enqueue(&self, kind: JobKind, project_id: Option<String>) -> QueueResult<bool> {
        // `IS ?` so that a NULL project filter compares equal to NULL.
        let existing: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM jobs
             WHERE kind = ? AND status = 'QUEUED' AND project_id IS ?",
        )
        .bind(kind.as_str())
        .bind(&project_id)
        .fetch_one(&self.pool)
        .await?
        .get("n");

        if existing > 0 {
            debug!(kind = %kind, project_id = ?project_id, "Identical job already queued");
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO jobs (id, kind, project_id, status, created_at)
             VALUES (?, ?, ?, 'QUEUED', ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(kind.as_str())
        .bind(&project_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(kind = %kind, project_id = ?project_id, "Enqueued job");
        Ok(true)
    }

    async fn claim_next(&self) -> QueueResult<Option<Job>> {
        loop {
            let row = sqlx::query(
                "SELECT id, kind, project_id, created_at FROM jobs
                 WHERE status = 'QUEUED'
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1",
            )
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = row else {
                return Ok(None);
            };

            let id_raw: String = row.get("id");
            let id = Uuid::parse_str(&id_raw)
                .map_err(|e| QueueError::Internal(format!("Invalid job id {id_raw}: {e}")))?;
            let kind_raw: String = row.get("kind");
            let kind = JobKind::parse(&kind_raw)
                .ok_or_else(|| QueueError::Internal(format!("Unknown job kind: {kind_raw}")))?;

            let claimed = sqlx::query(
                "UPDATE jobs SET status = 'RUNNING', started_at = ?
                 WHERE id = ? AND status = 'QUEUED'",
            )
            .bind(Utc::now())
            .bind(&id_raw)
            .execute(&self.pool)
            .await?
            .rows_affected();

            // Lost the race to another worker; try the next job.
            if claimed != 1 {
                continue;
            }

            return Ok(Some(Job {
                id,
                kind,
                project_id: row.get("project_id"),
                created_at: row.get("created_at"),
            }));
        }
    }

    async fn mark_done(&self, id: Uuid) -> QueueResult<()> {
        sqlx::query("UPDATE jobs SET status = 'DONE', finished_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> QueueResult<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'FAILED', error_message = ?, finished_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn queued_len(&self) -> QueueResult<u64> {
        let n: i64 = sqlx::query("SELECT COUNT(*) AS n FROM jobs WHERE status = 'QUEUED'")
            .fetch_one(&self.pool)
            .await?
            .get("n");
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn create_test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory pool");

        sqlx::query(
            "CREATE TABLE jobs (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                project_id TEXT,
                status TEXT NOT NULL DEFAULT 'QUEUED',
                error_message TEXT,
                created_at TIMESTAMP NOT NULL,
                started_at TIMESTAMP,
                finished_at TIMESTAMP
            )",
        )
        .execute(&pool)
        .await
        .expect("Failed to create jobs table");

        pool
    }

    #[tokio::test]
    async fn test_enqueue_dedupes_identical_queued_jobs() {
        let queue = DatabaseJobQueue::new(create_test_pool().await);

        assert!(queue.enqueue(JobKind::Ingest, None).await.expect("enqueue"));
        assert!(!queue.enqueue(JobKind::Ingest, None).await.expect("enqueue"));

        // Different kind or project filter is not a duplicate.
        assert!(
            queue
                .enqueue(JobKind::Aggregate, None)
                .await
                .expect("enqueue")
        );
        assert!(
            queue
                .enqueue(JobKind::Ingest, Some("proj-1".to_string()))
                .await
                .expect("enqueue")
        );

        assert_eq!(queue.queued_len().await.expect("len"), 3);
    }

    #[tokio::test]
    async fn test_claim_oldest_first() {
        let queue = DatabaseJobQueue::new(create_test_pool().await);

        queue
            .enqueue(JobKind::Ingest, None)
            .await
            .expect("enqueue");
        queue
            .enqueue(JobKind::Aggregate, Some("proj-1".to_string()))
            .await
            .expect("enqueue");

        let first = queue
            .claim_next()
            .await
            .expect("claim")
            .expect("job available");
        assert_eq!(first.kind, JobKind::Ingest);

        let second = queue
            .claim_next()
            .await
            .expect("claim")
            .expect("job available");
        assert_eq!(second.kind, JobKind::Aggregate);
        assert_eq!(second.project_id.as_deref(), Some("proj-1"));

        assert!(queue.claim_next().await.expect("claim").is_none());
    }

    #[tokio::test]
    async fn test_claimed_job_can_be_requeued_by_kind() {
        let queue = DatabaseJobQueue::new(create_test_pool().await);

        queue.enqueue(JobKind::Ingest, None).await.expect("enqueue");
        let job = queue
            .claim_next()
            .await
            .expect("claim")
            .expect("job available");

        // A running job no longer blocks a fresh enqueue of the same kind.
        assert!(queue.enqueue(JobKind::Ingest, None).await.expect("enqueue"));

        queue.mark_done(job.id).await.expect("mark done");
        assert_eq!(queue.queued_len().await.expect("len"), 1);
    }

    #[tokio::test]
    async fn test_mark_failed_records_error() {
        let queue = DatabaseJobQueue::new(create_test_pool().await);

        queue.enqueue(JobKind::Aggregate, None).await.expect("enqueue");
        let job = queue
            .claim_next()
            .await
            .expect("claim")
            .expect("job available");

        queue
            .mark_failed(job.id, "bucket unreachable")
            .await
            .expect("mark failed");

        assert!(queue.claim_next().await.expect("claim").is_none());
    }
}
