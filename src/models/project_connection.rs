use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-project S3 connection settings for billing exports.
///
/// The access key pair itself lives in the credential store; only the
/// parameter paths are persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConnection {
    pub project_id: String,
    pub aws_account_id: String,
    pub bucket_name: String,
    /// Key prefix under which billing exports are delivered.
    pub report_prefix: String,
    pub access_key_param_path: String,
    pub secret_key_param_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertProjectConnection {
    pub project_id: String,
    pub aws_account_id: String,
    pub bucket_name: String,
    pub report_prefix: String,
    pub access_key_param_path: String,
    pub secret_key_param_path: String,
}
