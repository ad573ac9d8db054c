//! S3-backed report store.
//!
//! Each project connects with its own static access key pair, so the
//! provider builds a fresh client per credential set rather than sharing
//! one process-wide client.

use std::{io::Read, sync::Arc};

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use flate2::read::GzDecoder;
use tracing::{debug, instrument};

use super::{
    ObjectInfo, ReportStore, ReportStoreError, ReportStoreProvider, ReportStoreResult,
    StoreCredentials, is_report_key, normalize_prefix,
};

/// Builds S3 clients for per-project credentials.
pub struct S3StoreProvider {
    region: String,
    endpoint_url: Option<String>,
}

impl S3StoreProvider {
    pub fn new(region: impl Into<String>, endpoint_url: Option<String>) -> Self {
        Self {
            region: region.into(),
            endpoint_url,
        }
    }
}

#[async_trait]
impl ReportStoreProvider for S3StoreProvider {
    async fn store_for(
        &self,
        credentials: StoreCredentials,
    ) -> ReportStoreResult<Arc<dyn ReportStore>> {
        let creds = Credentials::from_keys(
            credentials.access_key_id,
            credentials.secret_access_key,
            None,
        );

        let aws_config = aws_config::from_env()
            .region(aws_config::Region::new(self.region.clone()))
            .credentials_provider(creds)
            .load()
            .await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&aws_config);
        if let Some(endpoint_url) = &self.endpoint_url {
            s3_config = s3_config.endpoint_url(endpoint_url).force_path_style(true);
        }

        let client = Client::from_conf(s3_config.build());

        Ok(Arc::new(S3ReportStore { client }))
    }
}

/// Report store backed by one S3 client.
pub struct S3ReportStore {
    client: Client,
}

#[async_trait]
impl ReportStore for S3ReportStore {
    #[instrument(skip(self))]
    async fn list(&self, bucket: &str, prefix: &str) -> ReportStoreResult<Vec<ObjectInfo>> {
        let prefix = normalize_prefix(prefix);
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(&prefix);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(|e| {
                ReportStoreError::S3(format!(
                    "Failed to list s3://{}/{}: {}",
                    bucket,
                    prefix,
                    e.into_service_error()
                ))
            })?;

            for object in output.contents() {
                let Some(key) = object.key() else { continue };
                if !is_report_key(key) {
                    continue;
                }

                let last_modified = object
                    .last_modified()
                    .and_then(|dt| chrono::DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()));

                objects.push(ObjectInfo {
                    key: key.to_string(),
                    last_modified,
                });
            }

            match output.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(bucket, prefix, count = objects.len(), "Listed report objects");
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn fetch_text(&self, bucket: &str, key: &str) -> ReportStoreResult<String> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    ReportStoreError::NotFound(format!("s3://{}/{}", bucket, key))
                } else {
                    ReportStoreError::S3(format!(
                        "Failed to get s3://{}/{}: {}",
                        bucket, key, service_error
                    ))
                }
            })?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| ReportStoreError::S3(format!("Failed to read object body: {}", e)))?
            .into_bytes();

        let text = if key.ends_with(".gz") {
            let mut decoder = GzDecoder::new(bytes.as_ref());
            let mut decompressed = String::new();
            decoder
                .read_to_string(&mut decompressed)
                .map_err(|e| ReportStoreError::Decompress(e.to_string()))?;
            decompressed
        } else {
            String::from_utf8(bytes.to_vec()).map_err(|e| {
                ReportStoreError::Encoding(format!("s3://{}/{}: {}", bucket, key, e))
            })?
        };

        debug!(bucket, key, size = text.len(), "Fetched report object");
        Ok(text)
    }
}
