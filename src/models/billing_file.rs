use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a discovered billing export file.
///
/// Transitions: PENDING → PROCESSING → DONE | ERROR, PENDING → SKIPPED
/// (superseded version), and any terminal state → PENDING when a re-upload
/// is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingFileStatus {
    Pending,
    Processing,
    Done,
    Error,
    Skipped,
}

impl BillingFileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingFileStatus::Pending => "PENDING",
            BillingFileStatus::Processing => "PROCESSING",
            BillingFileStatus::Done => "DONE",
            BillingFileStatus::Error => "ERROR",
            BillingFileStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BillingFileStatus::Pending),
            "PROCESSING" => Some(BillingFileStatus::Processing),
            "DONE" => Some(BillingFileStatus::Done),
            "ERROR" => Some(BillingFileStatus::Error),
            "SKIPPED" => Some(BillingFileStatus::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillingFileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger row per billing export object discovered in S3.
///
/// Identity is `(project_id, bucket_name, object_key_hash)`; rows are never
/// deleted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingFile {
    pub id: Uuid,
    pub project_id: String,
    pub aws_account_id: String,
    pub bucket_name: String,
    pub object_key: String,
    /// SHA-256 hex digest of `object_key`.
    pub object_key_hash: String,
    /// `YYYY-MM` extracted from the object key; None when the key carries no
    /// billing-period segment (the file is registered but not aggregatable).
    pub billing_period: Option<String>,
    pub s3_last_modified_at: Option<DateTime<Utc>>,
    pub status: BillingFileStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a newly discovered file.
#[derive(Debug, Clone)]
pub struct NewBillingFile {
    pub project_id: String,
    pub aws_account_id: String,
    pub bucket_name: String,
    pub object_key: String,
    pub object_key_hash: String,
    pub billing_period: Option<String>,
    pub s3_last_modified_at: Option<DateTime<Utc>>,
    pub status: BillingFileStatus,
}
