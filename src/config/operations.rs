//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{Result, WopiError};
use chrono::Duration;
use std::path::Path;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(WopiError::Config)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            WopiError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load config from `path`, or the defaults when the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| WopiError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| WopiError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `lock_ttl_minutes` must be positive
    /// - `lock_owner` must be non-empty
    /// - `max_blob_size` must be positive
    /// - `base_url` (and `wopi_base_url` when set) must be http(s) URLs ending with `/`
    pub fn validate(&self) -> Result<()> {
        if self.lock_ttl_minutes == 0 {
            return Err(WopiError::Config(
                "lock_ttl_minutes must be greater than 0".to_string(),
            ));
        }

        if self.lock_owner.trim().is_empty() {
            return Err(WopiError::Config("lock_owner must be non-empty".to_string()));
        }

        if self.max_blob_size == 0 {
            return Err(WopiError::Config(
                "max_blob_size must be greater than 0".to_string(),
            ));
        }

        validate_url("base_url", &self.base_url)?;
        if let Some(url) = &self.wopi_base_url {
            validate_url("wopi_base_url", url)?;
        }

        Ok(())
    }

    /// Lock lifetime as a duration.
    pub fn lock_ttl(&self) -> Duration {
        Duration::minutes(i64::from(self.lock_ttl_minutes))
    }

    /// Base URL handed to WOPI clients for callbacks.
    pub fn effective_wopi_base_url(&self) -> &str {
        self.wopi_base_url.as_deref().unwrap_or(&self.base_url)
    }
}

fn validate_url(key: &str, url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(WopiError::Config(format!(
            "{} must start with http:// or https:// (found '{}')",
            key, url
        )));
    }
    if !url.ends_with('/') {
        return Err(WopiError::Config(format!(
            "{} must end with '/' (found '{}'). Use '{}/' instead.",
            key, url, url
        )));
    }
    Ok(())
}
