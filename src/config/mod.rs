//! Configuration and credential storage

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::attachment::POST_ATTACHMENT_LIMIT;
use crate::auth::{StoredToken, TokenStore};
use crate::session::SessionUser;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Portal REST API root, e.g. `https://portal.example.com/api`
    pub base_url: Option<String>,
    /// Client-side limit for a single request
    pub request_timeout_secs: Option<u64>,
    /// Size ceiling for chat attachments, in bytes
    pub max_attachment_bytes: Option<u64>,
    /// Stored bearer token
    pub access_token: Option<StoredToken>,
    /// User the token belongs to (from last login)
    pub user: Option<SessionUser>,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "portal-client", "portal-client")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Config holds the bearer token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// Validated API root without a trailing slash.
    pub fn base_url(&self) -> Result<String> {
        let raw = self
            .base_url
            .as_deref()
            .context("No portal URL configured. Run 'portal login --url <URL>'.")?;
        let url = Url::parse(raw).with_context(|| format!("Invalid portal URL: {}", raw))?;
        Ok(url.as_str().trim_end_matches('/').to_string())
    }

    pub fn set_base_url(&mut self, raw: &str) -> Result<()> {
        let url = Url::parse(raw).with_context(|| format!("Invalid portal URL: {}", raw))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Portal URL must be http or https, got {}", url.scheme());
        }
        self.base_url = Some(url.to_string());
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn attachment_limit(&self) -> u64 {
        self.max_attachment_bytes.unwrap_or(POST_ATTACHMENT_LIMIT)
    }

    pub fn set_user(&mut self, user: SessionUser) {
        self.user = Some(user);
    }
}

impl TokenStore for Config {
    fn get_access_token(&self) -> Option<StoredToken> {
        self.access_token.clone()
    }

    fn set_access_token(&mut self, token: String, expires_in: Option<u64>) {
        self.access_token = Some(StoredToken::new(token, expires_in));
    }

    fn clear_tokens(&mut self) {
        self.access_token = None;
        self.user = None;
    }
}
