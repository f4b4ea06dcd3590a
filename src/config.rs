use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::action_http::DispatchLimits;
use crate::settings::DEFAULT_URL;

/// Plugin config file name inside [`config_dir`].
pub(crate) const CONFIG_FILE: &str = "config.json";

/// Environment override for the config directory.
pub(crate) const CONFIG_DIR_ENV: &str = "ACTIONTHING_CONFIG_DIR";

const MIN_TIMEOUT_MS: u64 = 100;
const MAX_TIMEOUT_MS: u64 = 120_000;

/// Get the config directory.
///
/// `$ACTIONTHING_CONFIG_DIR` wins when set. Otherwise the platform location:
/// - macOS: `~/Library/Application Support/actionthing/`
/// - Linux: `~/.config/actionthing/` (or `$XDG_CONFIG_HOME`)
/// - Windows: `%APPDATA%/actionthing/`
///
/// Falls back to `~/.actionthing/` if no platform dir is available.
pub(crate) fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .map(|d| d.join("actionthing"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".actionthing")
        })
}

/// Load a JSON config file, returning Default if missing or corrupt.
/// A file that exists but cannot be read or parsed is reported on stderr
/// so a silent reset to defaults is visible.
pub(crate) fn load_json_config<T: DeserializeOwned + Default>(dir: &Path, filename: &str) -> T {
    let path = dir.join(filename);
    if !path.exists() {
        return T::default();
    }
    let content = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Warning: Could not read config {}: {e}", path.display());
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: Corrupt config {}: {e}. Using defaults.", path.display());
            T::default()
        }
    }
}

/// Save a JSON config file atomically (temp file + rename).
/// Sets 0600 permissions on Unix; button tokens may end up in here.
pub(crate) fn save_json_config<T: Serialize>(dir: &Path, filename: &str, config: &T) -> Result<(), String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create config directory: {e}"))?;

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {e}"))?;

    let target = dir.join(filename);
    let temp = dir.join(format!("{}.tmp.{}", filename, std::process::id()));

    std::fs::write(&temp, &json)
        .map_err(|e| format!("Failed to write temp config: {e}"))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&temp, perms)
            .map_err(|e| format!("Failed to set config permissions: {e}"))?;
    }

    std::fs::rename(&temp, &target).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        format!("Failed to commit config: {e}")
    })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// PluginConfig
// ---------------------------------------------------------------------------

/// How `authType = basic` turns the configured credentials into a header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BasicAuthEncoding {
    /// `username:password` when a username is set, otherwise the token alone.
    #[default]
    Credentials,
    /// Always the token alone.
    Token,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginConfig {
    /// Deadline for one HTTP call, connect through body read.
    pub request_timeout_ms: u64,
    /// Response bytes kept per call; the rest is dropped.
    pub max_response_bytes: usize,
    pub basic_auth_encoding: BasicAuthEncoding,
    /// URL prefix patterns (trailing `*` = wildcard). Empty = any http/https URL.
    pub allowed_urls: Vec<String>,
    /// Target used when a trigger carries no URL.
    pub default_url: String,
    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5000,
            max_response_bytes: 64 * 1024,
            basic_auth_encoding: BasicAuthEncoding::default(),
            allowed_urls: Vec::new(),
            default_url: DEFAULT_URL.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl PluginConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS))
    }

    pub(crate) fn dispatch_limits(&self) -> DispatchLimits {
        DispatchLimits {
            timeout: self.request_timeout(),
            max_response_bytes: self.max_response_bytes,
            allowed_urls: self.allowed_urls.clone(),
        }
    }
}

pub fn load_plugin_config() -> PluginConfig {
    load_json_config(&config_dir(), CONFIG_FILE)
}

pub fn save_plugin_config(config: &PluginConfig) -> Result<(), String> {
    save_json_config(&config_dir(), CONFIG_FILE, config)
}
