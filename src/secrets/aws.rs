//! AWS SSM Parameter Store implementation.
//!
//! Stores credentials as SecureString parameters and reads them back
//! decrypted. Uses the AWS SDK for Rust with the standard credential chain
//! (environment, instance profile, etc.)

use async_trait::async_trait;
use aws_sdk_ssm::{Client, types::ParameterType};

use super::{SecretError, SecretManager, SecretResult};

/// Configuration for the SSM Parameter Store backend.
#[derive(Debug, Clone)]
pub struct SsmParameterStoreConfig {
    /// AWS region (e.g., "ap-northeast-1")
    pub region: Option<String>,
    /// Optional prefix prepended to all parameter paths
    pub prefix: String,
    /// Optional endpoint URL for testing with localstack
    pub endpoint_url: Option<String>,
}

impl SsmParameterStoreConfig {
    /// Create a new config with the given region.
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            prefix: String::new(),
            endpoint_url: None,
        }
    }

    /// Create a new config using the default region from environment.
    pub fn from_env() -> Self {
        Self {
            region: None,
            prefix: String::new(),
            endpoint_url: None,
        }
    }

    /// Set the parameter path prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set a custom endpoint URL (useful for localstack testing).
    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }
}

/// SSM Parameter Store secret manager.
pub struct SsmParameterStore {
    client: Client,
    prefix: String,
}

impl SsmParameterStore {
    /// Create a new Parameter Store client with the given configuration.
    pub async fn new(config: SsmParameterStoreConfig) -> SecretResult<Self> {
        let mut aws_config = aws_config::from_env();

        if let Some(region) = &config.region {
            aws_config = aws_config.region(aws_config::Region::new(region.clone()));
        }

        let aws_config = aws_config.load().await;

        let mut ssm_config = aws_sdk_ssm::config::Builder::from(&aws_config);

        if let Some(endpoint_url) = &config.endpoint_url {
            ssm_config = ssm_config.endpoint_url(endpoint_url);
        }

        let client = Client::from_conf(ssm_config.build());

        Ok(Self {
            client,
            prefix: config.prefix,
        })
    }

    /// Build the full parameter path with prefix.
    fn full_path(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}{}", self.prefix, path)
        }
    }
}

#[async_trait]
impl SecretManager for SsmParameterStore {
    async fn get(&self, path: &str) -> SecretResult<Option<String>> {
        let name = self.full_path(path);

        match self
            .client
            .get_parameter()
            .name(&name)
            .with_decryption(true)
            .send()
            .await
        {
            Ok(output) => Ok(output.parameter().and_then(|p| p.value()).map(String::from)),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_parameter_not_found() {
                    Ok(None)
                } else {
                    Err(SecretError::Internal(format!(
                        "Failed to get parameter '{}': {}",
                        path, service_error
                    )))
                }
            }
        }
    }

    async fn set(&self, path: &str, value: &str) -> SecretResult<()> {
        let name = self.full_path(path);

        self.client
            .put_parameter()
            .name(&name)
            .value(value)
            .r#type(ParameterType::SecureString)
            .overwrite(true)
            .send()
            .await
            .map_err(|e| {
                SecretError::Internal(format!(
                    "Failed to put parameter '{}': {}",
                    path,
                    e.into_service_error()
                ))
            })?;

        Ok(())
    }

    async fn delete(&self, path: &str) -> SecretResult<()> {
        let name = self.full_path(path);

        match self.client.delete_parameter().name(&name).send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_parameter_not_found() {
                    // Already gone, not an error
                    Ok(())
                } else {
                    Err(SecretError::Internal(format!(
                        "Failed to delete parameter '{}': {}",
                        path, service_error
                    )))
                }
            }
        }
    }

    async fn health_check(&self) -> SecretResult<()> {
        match self
            .client
            .describe_parameters()
            .max_results(1)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => Err(SecretError::Connection(format!(
                "Parameter Store health check failed: {}",
                err.into_service_error()
            ))),
        }
    }
}
