//! Background loops: the job worker and the ingestion scheduler.
//!
//! One worker drains the queue sequentially. Keeping it single means two
//! aggregation runs can never interleave their group writes.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{Job, JobKind};
use crate::batch::{self, BatchContext};

/// Spawn the worker loop. Polls the queue, runs each claimed job to
/// completion, and stops when `shutdown` fires.
pub fn start_job_worker(
    ctx: Arc<BatchContext>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(poll_secs = poll_interval.as_secs(), "Job worker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }

            loop {
                if shutdown.is_cancelled() {
                    break;
                }
                match ctx.queue.claim_next().await {
                    Ok(Some(job)) => run_job(&ctx, &job).await,
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "Failed to claim next job");
                        break;
                    }
                }
            }
        }

        info!("Job worker stopped");
    })
}

async fn run_job(ctx: &BatchContext, job: &Job) {
    debug!(job_id = %job.id, kind = %job.kind, project_id = ?job.project_id, "Running job");

    let result = match job.kind {
        JobKind::Ingest => batch::run_ingestion(ctx, job.project_id.as_deref())
            .await
            .map(|_| ()),
        JobKind::Aggregate => batch::run_aggregation(ctx, job.project_id.as_deref())
            .await
            .map(|_| ()),
    };

    let finish = match result {
        Ok(()) => ctx.queue.mark_done(job.id).await,
        Err(e) => {
            error!(job_id = %job.id, kind = %job.kind, error = %e, "Job failed");
            ctx.queue.mark_failed(job.id, &e.to_string()).await
        }
    };
    if let Err(e) = finish {
        error!(job_id = %job.id, error = %e, "Failed to record job outcome");
    }
}

/// Spawn the scheduler loop: enqueue an all-projects ingestion job every
/// `interval`. Deduplication in the queue keeps a slow worker from piling
/// up identical jobs.
pub fn start_ingest_scheduler(
    ctx: Arc<BatchContext>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Ingestion scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            match ctx.queue.enqueue(JobKind::Ingest, None).await {
                Ok(true) => debug!("Scheduled ingestion job"),
                Ok(false) => debug!("Ingestion job already queued"),
                Err(e) => error!(error = %e, "Failed to schedule ingestion job"),
            }
        }

        info!("Ingestion scheduler stopped");
    })
}
