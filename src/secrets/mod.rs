//! Credential store for per-project S3 access keys.
//!
//! Supports multiple backends:
//! - AWS SSM Parameter Store (production)
//! - Environment variables (local development)
//! - In-memory (for testing)

mod aws;

use async_trait::async_trait;
pub use aws::{SsmParameterStore, SsmParameterStoreConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type SecretResult<T> = Result<T, SecretError>;

/// Trait for reading and writing stored credentials by parameter path.
#[async_trait]
pub trait SecretManager: Send + Sync {
    /// Get a secret by path. Returns None if not found.
    async fn get(&self, path: &str) -> SecretResult<Option<String>>;

    /// Set a secret. Not all backends support this.
    async fn set(&self, path: &str, value: &str) -> SecretResult<()>;

    /// Delete a secret. Not all backends support this.
    async fn delete(&self, path: &str) -> SecretResult<()>;

    /// Check if the secret manager is healthy/connected.
    async fn health_check(&self) -> SecretResult<()> {
        Ok(())
    }
}

/// In-memory secret manager (for testing only)
pub struct MemorySecretManager {
    secrets: std::sync::Arc<dashmap::DashMap<String, String>>,
}

impl MemorySecretManager {
    pub fn new() -> Self {
        Self {
            secrets: std::sync::Arc::new(dashmap::DashMap::new()),
        }
    }
}

impl Default for MemorySecretManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretManager for MemorySecretManager {
    async fn get(&self, path: &str) -> SecretResult<Option<String>> {
        Ok(self.secrets.get(path).map(|v| v.value().clone()))
    }

    async fn set(&self, path: &str, value: &str) -> SecretResult<()> {
        self.secrets.insert(path.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, path: &str) -> SecretResult<()> {
        self.secrets.remove(path);
        Ok(())
    }
}

/// Environment-based secret manager (reads from env vars)
pub struct EnvSecretManager;

impl EnvSecretManager {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EnvSecretManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretManager for EnvSecretManager {
    async fn get(&self, path: &str) -> SecretResult<Option<String>> {
        Ok(std::env::var(path).ok())
    }

    async fn set(&self, _path: &str, _value: &str) -> SecretResult<()> {
        Err(SecretError::Internal(
            "Cannot set secrets in environment manager".to_string(),
        ))
    }

    async fn delete(&self, _path: &str) -> SecretResult<()> {
        Err(SecretError::Internal(
            "Cannot delete secrets from environment manager".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let manager = MemorySecretManager::new();

        manager
            .set("/finops/proj-1/access-key", "AKIAEXAMPLE")
            .await
            .expect("set should succeed");

        let value = manager
            .get("/finops/proj-1/access-key")
            .await
            .expect("get should succeed");
        assert_eq!(value.as_deref(), Some("AKIAEXAMPLE"));

        manager
            .delete("/finops/proj-1/access-key")
            .await
            .expect("delete should succeed");
        let value = manager
            .get("/finops/proj-1/access-key")
            .await
            .expect("get should succeed");
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_env_manager_is_read_only() {
        let manager = EnvSecretManager::new();

        assert!(manager.set("KEY", "value").await.is_err());
        assert!(manager.delete("KEY").await.is_err());
    }
}
