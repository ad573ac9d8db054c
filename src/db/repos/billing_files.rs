use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{BillingFile, NewBillingFile},
};

#[async_trait]
pub trait BillingFileRepo: Send + Sync {
    /// Register a newly discovered file. Fails with `Conflict` if a row with
    /// the same `(project_id, bucket_name, object_key_hash)` already exists.
    async fn create(&self, input: NewBillingFile) -> DbResult<BillingFile>;

    /// Look up a row by its identity triple.
    async fn find_by_identity(
        &self,
        project_id: &str,
        bucket_name: &str,
        object_key_hash: &str,
    ) -> DbResult<Option<BillingFile>>;

    /// List PENDING rows oldest-first, optionally scoped to one project.
    async fn list_pending(
        &self,
        project_id: Option<&str>,
        limit: i64,
    ) -> DbResult<Vec<BillingFile>>;

    /// All rows for one project and billing period, regardless of status.
    async fn list_by_project_and_period(
        &self,
        project_id: &str,
        billing_period: &str,
    ) -> DbResult<Vec<BillingFile>>;

    /// Claim a PENDING row for processing (PENDING → PROCESSING).
    ///
    /// Conditional update on the current status; returns false when another
    /// worker already claimed the row. This is the pipeline's sole
    /// concurrency primitive.
    async fn claim_pending(&self, id: Uuid) -> DbResult<bool>;

    /// Mark a row DONE and clear any error message.
    async fn mark_done(&self, id: Uuid) -> DbResult<()>;

    /// Mark a row ERROR with the failure message.
    async fn mark_error(&self, id: Uuid, message: &str) -> DbResult<()>;

    /// Reset a row to PENDING after a re-upload, recording the newer S3
    /// modification time.
    async fn reset_to_pending(
        &self,
        id: Uuid,
        s3_last_modified_at: DateTime<Utc>,
    ) -> DbResult<()>;
}
