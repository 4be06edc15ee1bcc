//! Configuration management for s3fuse

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default AWS region when none is supplied
pub const DEFAULT_REGION: &str = "us-west-2";

/// Credentials for the object store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Access key ID
    #[serde(default)]
    pub access_key: String,

    /// Secret access key
    #[serde(default)]
    pub secret_key: String,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Object store credentials
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Bucket presented as the filesystem root
    #[serde(default)]
    pub bucket: String,

    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint URL (MinIO, Ceph RGW, ...); None for AWS proper
    pub endpoint: Option<String>,

    /// Local mount path
    #[serde(default)]
    pub mount_point: PathBuf,

    /// Allow other users to access the mount
    #[serde(default)]
    pub allow_other: bool,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            credentials: CredentialsConfig::default(),
            bucket: String::new(),
            region: default_region(),
            endpoint: None,
            mount_point: PathBuf::new(),
            allow_other: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Apply environment variable overrides to configuration.
    ///
    /// Environment variables fill in values not already set, so explicit
    /// CLI flags and config-file entries win over the ambient AWS variables.
    pub fn apply_env_overrides(&mut self) {
        if self.credentials.access_key.is_empty() {
            if let Ok(key) = std::env::var("AWS_ACCESS_KEY_ID") {
                self.credentials.access_key = key.trim().to_string();
            }
        }

        if self.credentials.secret_key.is_empty() {
            if let Ok(key) = std::env::var("AWS_SECRET_ACCESS_KEY") {
                self.credentials.secret_key = key.trim().to_string();
            }
        }

        if let Ok(region) = std::env::var("AWS_DEFAULT_REGION") {
            let region = region.trim();
            if !region.is_empty() && self.region == DEFAULT_REGION {
                self.region = region.to_string();
            }
        }

        if self.endpoint.is_none() {
            if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
                let endpoint = endpoint.trim().to_string();
                if !endpoint.is_empty() {
                    self.endpoint = Some(endpoint);
                }
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(Error::Config("Bucket name is required".to_string()));
        }

        if self.credentials.access_key.is_empty() {
            return Err(Error::Config(
                "Access key is required (flag or AWS_ACCESS_KEY_ID)".to_string(),
            ));
        }

        if self.credentials.secret_key.is_empty() {
            return Err(Error::Config(
                "Secret key is required (flag or AWS_SECRET_ACCESS_KEY)".to_string(),
            ));
        }

        if self.mount_point.as_os_str().is_empty() {
            return Err(Error::Config("Mount point is required".to_string()));
        }

        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(Error::Config(format!(
                    "Endpoint must include a scheme (http/https): {}",
                    endpoint
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            credentials: CredentialsConfig {
                access_key: "AKIATEST".to_string(),
                secret_key: "secret".to_string(),
            },
            bucket: "test-bucket".to_string(),
            region: DEFAULT_REGION.to_string(),
            endpoint: Some("http://127.0.0.1:9000".to_string()),
            mount_point: PathBuf::from("/mnt/s3"),
            allow_other: false,
        }
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_bucket() {
        let mut config = valid_config();
        config.bucket.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_schemeless_endpoint() {
        let mut config = valid_config();
        config.endpoint = Some("127.0.0.1:9000".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = valid_config();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.bucket, config.bucket);
        assert_eq!(loaded.region, config.region);
        assert_eq!(loaded.endpoint, config.endpoint);
        assert_eq!(loaded.mount_point, config.mount_point);
    }
}
