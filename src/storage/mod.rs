//! Access to billing export objects in S3-compatible storage.
//!
//! `ReportStore` abstracts the two operations the pipeline needs — listing
//! report objects under a prefix and fetching one object's text — so the
//! engines can run against an in-memory store in tests. Because every
//! project connects with its own access key pair, stores are built
//! per-project through `ReportStoreProvider`.

mod s3;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
pub use s3::S3StoreProvider;
use thiserror::Error;

/// Errors that can occur talking to the object store.
#[derive(Debug, Error)]
pub enum ReportStoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Decompression error: {0}")]
    Decompress(String),

    #[error("Object is not valid UTF-8: {0}")]
    Encoding(String),
}

pub type ReportStoreResult<T> = Result<T, ReportStoreError>;

/// Listing entry: object key plus the store's modification timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Access key pair for one project's report bucket.
#[derive(Debug, Clone)]
pub struct StoreCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Report object listing and retrieval.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// List report objects (`.csv` / `.csv.gz`) under the prefix. The
    /// prefix is normalized to end with `/`; pagination is followed to
    /// exhaustion.
    async fn list(&self, bucket: &str, prefix: &str) -> ReportStoreResult<Vec<ObjectInfo>>;

    /// Fetch one object's body as text, gunzipping when the key ends in
    /// `.gz`.
    async fn fetch_text(&self, bucket: &str, key: &str) -> ReportStoreResult<String>;
}

/// Builds a [`ReportStore`] for one project's credentials.
#[async_trait]
pub trait ReportStoreProvider: Send + Sync {
    async fn store_for(
        &self,
        credentials: StoreCredentials,
    ) -> ReportStoreResult<Arc<dyn ReportStore>>;
}

/// Whether a key looks like a billing report object.
pub(crate) fn is_report_key(key: &str) -> bool {
    key.ends_with(".csv") || key.ends_with(".csv.gz")
}

/// Normalize a listing prefix to end with exactly one `/`.
pub(crate) fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// In-memory report store (for testing only). Ignores credentials.
pub struct MemoryReportStore {
    objects: DashMap<String, (String, Option<DateTime<Utc>>)>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
        }
    }

    pub fn insert_object(
        &self,
        bucket: &str,
        key: &str,
        body: &str,
        last_modified: Option<DateTime<Utc>>,
    ) {
        self.objects.insert(
            format!("{}/{}", bucket, key),
            (body.to_string(), last_modified),
        );
    }

    pub fn remove_object(&self, bucket: &str, key: &str) {
        self.objects.remove(&format!("{}/{}", bucket, key));
    }
}

impl Default for MemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn list(&self, bucket: &str, prefix: &str) -> ReportStoreResult<Vec<ObjectInfo>> {
        let full_prefix = format!("{}/{}", bucket, normalize_prefix(prefix));
        let bucket_prefix = format!("{}/", bucket);

        let mut objects: Vec<ObjectInfo> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(&full_prefix))
            .filter(|entry| is_report_key(entry.key()))
            .map(|entry| ObjectInfo {
                key: entry.key()[bucket_prefix.len()..].to_string(),
                last_modified: entry.value().1,
            })
            .collect();

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn fetch_text(&self, bucket: &str, key: &str) -> ReportStoreResult<String> {
        self.objects
            .get(&format!("{}/{}", bucket, key))
            .map(|entry| entry.value().0.clone())
            .ok_or_else(|| ReportStoreError::NotFound(format!("{}/{}", bucket, key)))
    }
}

#[async_trait]
impl ReportStoreProvider for Arc<MemoryReportStore> {
    async fn store_for(
        &self,
        _credentials: StoreCredentials,
    ) -> ReportStoreResult<Arc<dyn ReportStore>> {
        Ok(self.clone())
    }
}
