//! Export file discovery.
//!
//! Walks every configured project connection, lists the report objects in
//! its bucket, and reconciles them against the billing file ledger. Newly
//! seen objects are registered PENDING (or SKIPPED when a newer export
//! version already supersedes them); re-uploaded objects are reset to
//! PENDING. Projects whose discovery turned up new work get an aggregation
//! job enqueued.
//!
//! A failure in one project is logged and does not stop the others.

use sha2::{Digest, Sha256};
use tracing::{error, info, instrument};

use super::{BatchContext, BatchError, BatchResult};
use crate::{
    cur::{extract_billing_period, extract_version_token, is_eligible, latest_version_per_group},
    models::{BillingFileStatus, NewBillingFile, ProjectConnection},
    queue::JobKind,
    storage::{ObjectInfo, StoreCredentials},
};

/// Counters for one ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionOutcome {
    pub projects_scanned: usize,
    pub projects_failed: usize,
    /// New objects registered PENDING.
    pub registered: usize,
    /// New objects registered SKIPPED (superseded export version).
    pub skipped: usize,
    /// Known objects reset to PENDING after a re-upload.
    pub reset: usize,
}

/// SHA-256 hex digest used as the object key's ledger identity.
pub(crate) fn object_key_hash(object_key: &str) -> String {
    hex::encode(Sha256::digest(object_key.as_bytes()))
}

fn group_key(project_id: &str, object_key: &str) -> String {
    let period = extract_billing_period(object_key)
        .map(|p| p.to_string())
        .unwrap_or_default();
    format!("{}::{}", project_id, period)
}

/// Discover report objects for all (or one) project connections.
#[instrument(skip(ctx))]
pub async fn run_ingestion(
    ctx: &BatchContext,
    project_filter: Option<&str>,
) -> BatchResult<IngestionOutcome> {
    let connections = ctx.db.project_connections().list(project_filter).await?;
    let mut outcome = IngestionOutcome::default();

    for connection in connections {
        outcome.projects_scanned += 1;
        match ingest_project(ctx, &connection).await {
            Ok(project) => {
                outcome.registered += project.registered;
                outcome.skipped += project.skipped;
                outcome.reset += project.reset;
            }
            Err(e) => {
                error!(
                    project_id = %connection.project_id,
                    error = %e,
                    "Ingestion failed for project"
                );
                outcome.projects_failed += 1;
            }
        }
    }

    info!(
        projects = outcome.projects_scanned,
        registered = outcome.registered,
        reset = outcome.reset,
        skipped = outcome.skipped,
        failed = outcome.projects_failed,
        "Ingestion run finished"
    );
    Ok(outcome)
}

#[derive(Default)]
struct ProjectIngest {
    registered: usize,
    skipped: usize,
    reset: usize,
}

async fn ingest_project(
    ctx: &BatchContext,
    connection: &ProjectConnection,
) -> BatchResult<ProjectIngest> {
    let project_id = &connection.project_id;

    let access_key_id = ctx.secrets.get(&connection.access_key_param_path).await?;
    let secret_access_key = ctx.secrets.get(&connection.secret_key_param_path).await?;
    let (Some(access_key_id), Some(secret_access_key)) = (access_key_id, secret_access_key) else {
        return Err(BatchError::MissingCredentials(project_id.clone()));
    };

    let store = ctx
        .stores
        .store_for(StoreCredentials {
            access_key_id,
            secret_access_key,
        })
        .await?;

    let objects = store
        .list(&connection.bucket_name, &connection.report_prefix)
        .await?;

    // First pass: which export version is the latest per billing period.
    let latest = latest_version_per_group(
        &objects,
        |o: &ObjectInfo| group_key(project_id, &o.key),
        |o: &ObjectInfo| {
            extract_billing_period(&o.key).and_then(|_| extract_version_token(&o.key))
        },
    );

    let repo = ctx.db.billing_files();
    let mut result = ProjectIngest::default();
    let mut new_work = false;

    for object in &objects {
        let hash = object_key_hash(&object.key);
        let period = extract_billing_period(&object.key);
        let token = period.and_then(|_| extract_version_token(&object.key));
        let group = group_key(project_id, &object.key);
        let eligible = is_eligible(latest.get(&group).map(String::as_str), token.as_deref());

        let existing = repo
            .find_by_identity(project_id, &connection.bucket_name, &hash)
            .await?;

        match existing {
            None => {
                let status = if eligible {
                    BillingFileStatus::Pending
                } else {
                    BillingFileStatus::Skipped
                };
                repo.create(NewBillingFile {
                    project_id: project_id.clone(),
                    aws_account_id: connection.aws_account_id.clone(),
                    bucket_name: connection.bucket_name.clone(),
                    object_key: object.key.clone(),
                    object_key_hash: hash,
                    billing_period: period.map(|p| p.to_string()),
                    s3_last_modified_at: object.last_modified,
                    status,
                })
                .await?;

                if eligible {
                    result.registered += 1;
                    new_work = true;
                } else {
                    result.skipped += 1;
                }
            }
            Some(row) => {
                if let Some(seen) = object.last_modified
                    && row.s3_last_modified_at.is_none_or(|stored| seen > stored)
                {
                    repo.reset_to_pending(row.id, seen).await?;
                    result.reset += 1;
                    new_work = true;
                }
            }
        }
    }

    if new_work {
        ctx.queue
            .enqueue(JobKind::Aggregate, Some(project_id.clone()))
            .await?;
    }

    info!(
        project_id = %project_id,
        objects = objects.len(),
        registered = result.registered,
        reset = result.reset,
        skipped = result.skipped,
        "Project ingestion finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::{
        db::DbPool,
        models::UpsertProjectConnection,
        queue::MemoryJobQueue,
        secrets::{MemorySecretManager, SecretManager},
        storage::MemoryReportStore,
    };

    const CSV: &str = "line_item_usage_start_date,line_item_unblended_cost,line_item_currency_code,product_servicecode\n2026-08-01,1.00,USD,AmazonEC2\n";

    async fn create_test_db() -> Arc<DbPool> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory pool");
        let db = DbPool::from_pool(pool);
        db.run_migrations().await.expect("Migrations should apply");
        Arc::new(db)
    }

    struct Harness {
        ctx: BatchContext,
        store: Arc<MemoryReportStore>,
        queue: Arc<MemoryJobQueue>,
    }

    async fn create_harness() -> Harness {
        let db = create_test_db().await;
        let store = Arc::new(MemoryReportStore::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let secrets = Arc::new(MemorySecretManager::new());

        let ctx = BatchContext {
            db,
            secrets: secrets.clone(),
            stores: Arc::new(store.clone()),
            queue: queue.clone(),
            pending_limit: 100,
        };

        ctx.db
            .project_connections()
            .upsert(UpsertProjectConnection {
                project_id: "proj-1".to_string(),
                aws_account_id: "111122223333".to_string(),
                bucket_name: "billing-bucket".to_string(),
                report_prefix: "reports".to_string(),
                access_key_param_path: "/finops/proj-1/access-key".to_string(),
                secret_key_param_path: "/finops/proj-1/secret-key".to_string(),
            })
            .await
            .expect("Connection upsert should succeed");

        secrets
            .set("/finops/proj-1/access-key", "AKIAEXAMPLE")
            .await
            .expect("set access key");
        secrets
            .set("/finops/proj-1/secret-key", "secret")
            .await
            .expect("set secret key");

        Harness { ctx, store, queue }
    }

    #[tokio::test]
    async fn test_first_run_registers_and_second_run_is_idempotent() {
        let h = create_harness().await;
        let modified = Utc.with_ymd_and_hms(2026, 8, 20, 0, 0, 0).single();
        h.store.insert_object(
            "billing-bucket",
            "reports/BILLING_PERIOD=2026-08/data-001.csv.gz",
            CSV,
            modified,
        );
        h.store.insert_object(
            "billing-bucket",
            "reports/BILLING_PERIOD=2026-08/data-002.csv.gz",
            CSV,
            modified,
        );

        let outcome = run_ingestion(&h.ctx, None).await.expect("run should succeed");
        assert_eq!(outcome.registered, 2);
        assert_eq!(outcome.reset, 0);
        assert_eq!(outcome.skipped, 0);

        let pending = h
            .ctx
            .db
            .billing_files()
            .list_pending(Some("proj-1"), 100)
            .await
            .expect("list pending");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].billing_period.as_deref(), Some("2026-08"));

        assert_eq!(
            h.queue.queued_jobs(),
            vec![(JobKind::Aggregate, Some("proj-1".to_string()))]
        );

        // Nothing changed upstream, so a second run registers nothing and
        // enqueues nothing new.
        let outcome = run_ingestion(&h.ctx, None).await.expect("run should succeed");
        assert_eq!(outcome.registered, 0);
        assert_eq!(outcome.reset, 0);
        assert_eq!(h.queue.queued_jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_superseded_version_registered_skipped() {
        let h = create_harness().await;
        h.store.insert_object(
            "billing-bucket",
            "reports/BILLING_PERIOD=2026-08/20260810T000000Z-old1/data-001.csv.gz",
            CSV,
            None,
        );
        h.store.insert_object(
            "billing-bucket",
            "reports/BILLING_PERIOD=2026-08/20260820T000000Z-new1/data-001.csv.gz",
            CSV,
            None,
        );

        let outcome = run_ingestion(&h.ctx, None).await.expect("run should succeed");
        assert_eq!(outcome.registered, 1);
        assert_eq!(outcome.skipped, 1);

        let old = h
            .ctx
            .db
            .billing_files()
            .find_by_identity(
                "proj-1",
                "billing-bucket",
                &object_key_hash(
                    "reports/BILLING_PERIOD=2026-08/20260810T000000Z-old1/data-001.csv.gz",
                ),
            )
            .await
            .expect("find")
            .expect("row exists");
        assert_eq!(old.status, BillingFileStatus::Skipped);
    }

    #[tokio::test]
    async fn test_re_upload_resets_to_pending() {
        let h = create_harness().await;
        let key = "reports/BILLING_PERIOD=2026-08/data-001.csv.gz";
        let first = Utc.with_ymd_and_hms(2026, 8, 10, 0, 0, 0).single();
        h.store.insert_object("billing-bucket", key, CSV, first);

        run_ingestion(&h.ctx, None).await.expect("first run");

        let repo = h.ctx.db.billing_files();
        let row = repo
            .find_by_identity("proj-1", "billing-bucket", &object_key_hash(key))
            .await
            .expect("find")
            .expect("row exists");
        repo.mark_done(row.id).await.expect("mark done");

        // Same key, newer modification time.
        let second = Utc.with_ymd_and_hms(2026, 8, 11, 0, 0, 0).single();
        h.store.insert_object("billing-bucket", key, CSV, second);

        let outcome = run_ingestion(&h.ctx, None).await.expect("second run");
        assert_eq!(outcome.registered, 0);
        assert_eq!(outcome.reset, 1);

        let row = repo
            .find_by_identity("proj-1", "billing-bucket", &object_key_hash(key))
            .await
            .expect("find")
            .expect("row exists");
        assert_eq!(row.status, BillingFileStatus::Pending);
        assert_eq!(row.s3_last_modified_at, second);
    }

    #[tokio::test]
    async fn test_missing_credentials_fails_project_only() {
        let h = create_harness().await;
        h.ctx
            .secrets
            .delete("/finops/proj-1/secret-key")
            .await
            .expect("delete");
        h.store.insert_object(
            "billing-bucket",
            "reports/BILLING_PERIOD=2026-08/data-001.csv.gz",
            CSV,
            None,
        );

        let outcome = run_ingestion(&h.ctx, None).await.expect("run should succeed");
        assert_eq!(outcome.projects_failed, 1);
        assert_eq!(outcome.registered, 0);
        assert!(h.queue.queued_jobs().is_empty());
    }
}
