//! Config struct definition and default implementation.

use serde::{Deserialize, Serialize};

/// Configuration for the WOPI host.
///
/// This struct represents the contents of `.wopilock/config.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Minutes a WOPI lock lives without being refreshed.
    #[serde(default = "default_lock_ttl_minutes")]
    pub lock_ttl_minutes: u32,

    /// Owner marker set on the repository's native lock while WOPI locks are live.
    #[serde(default = "default_lock_owner")]
    pub lock_owner: String,

    // =========================================================================
    // Content settings
    // =========================================================================
    /// Whether renaming a file advances its item version.
    #[serde(default)]
    pub rename_bumps_item_version: bool,

    /// Whether PutFile on an unlocked file is restricted to empty blobs.
    #[serde(default = "default_true")]
    pub require_lock_for_non_empty_put: bool,

    /// Whether PutRelativeFile without conversion may create a new document.
    #[serde(default = "default_true")]
    pub allow_put_relative_creation: bool,

    /// Largest blob (in bytes) GetFile will serve.
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,

    // =========================================================================
    // URL settings
    // =========================================================================
    /// Base URL of the host, used for view/edit/share URLs. Ends with `/`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Base URL the WOPI client should call back; falls back to `base_url`.
    #[serde(default)]
    pub wopi_base_url: Option<String>,

    /// Brand name reported in CheckFileInfo breadcrumbs.
    #[serde(default = "default_brand_name")]
    pub brand_name: String,
}

// Default value functions for serde
fn default_lock_ttl_minutes() -> u32 {
    30
}
fn default_lock_owner() -> String {
    "wopi".to_string()
}
fn default_max_blob_size() -> u64 {
    i32::MAX as u64
}
fn default_base_url() -> String {
    "http://localhost:8080/".to_string()
}
fn default_brand_name() -> String {
    "WOPI Host".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_ttl_minutes: default_lock_ttl_minutes(),
            lock_owner: default_lock_owner(),
            rename_bumps_item_version: false,
            require_lock_for_non_empty_put: default_true(),
            allow_put_relative_creation: default_true(),
            max_blob_size: default_max_blob_size(),
            base_url: default_base_url(),
            wopi_base_url: None,
            brand_name: default_brand_name(),
        }
    }
}
