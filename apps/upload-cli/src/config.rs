//! Uploader configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/lexicon/upload.toml`
//! - Windows: `%APPDATA%/lexicon/upload.toml`
//!
//! `LEXICON_API_URL` and `LEXICON_AUTH_TOKEN` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lexicon_upload::{HttpTransportOptions, UploadConfig};
use serde::{Deserialize, Serialize};

/// Environment variable overriding `api_url`.
pub const ENV_API_URL: &str = "LEXICON_API_URL";

/// Environment variable overriding `auth_token`.
pub const ENV_AUTH_TOKEN: &str = "LEXICON_AUTH_TOKEN";

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Media server base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Owner of uploaded media.
    #[serde(default)]
    pub user_id: String,

    /// Bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Raw `Cookie` header for cookie-based sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Chunking parameters.
    #[serde(default)]
    pub upload: UploadConfig,
}

fn default_api_url() -> String {
    "http://localhost:8081".into()
}

fn default_request_timeout() -> u64 {
    lexicon_protocol::constants::REQUEST_TIMEOUT.as_secs()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            user_id: String::new(),
            auth_token: None,
            session_cookie: None,
            request_timeout_secs: default_request_timeout(),
            upload: UploadConfig::default(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from `path` (or the default location), creating
    /// a default file if none exists, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path(),
        };
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from `path`, creating a default if not found.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: CliConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = CliConfig::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // May contain a token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Replaces `api_url` and `auth_token` with non-empty values from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            self.api_url = url;
        }
        if let Some(token) = lookup(ENV_AUTH_TOKEN).filter(|v| !v.is_empty()) {
            self.auth_token = Some(token);
        }
    }

    /// HTTP transport settings derived from this configuration.
    pub fn transport_options(&self) -> HttpTransportOptions {
        HttpTransportOptions {
            auth_token: self.auth_token.clone(),
            session_cookie: self.session_cookie.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..Default::default()
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("lexicon").join("upload.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("lexicon")
            .join("upload.toml")
    }
}
