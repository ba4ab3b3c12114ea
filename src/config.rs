//! Global configuration parsing, defaulting, and validation.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::rule::RejectionRule;
use crate::{AppError, Result};

/// Longest accepted identity refresh interval (30 days).
pub const MAX_IDENTITY_REFRESH_SECONDS: u64 = 30 * 24 * 3600;

fn default_refresh_seconds() -> u64 {
    3600
}

fn default_health_port() -> u16 {
    8080
}

fn default_health_path() -> String {
    "/health".into()
}

fn default_shutdown_timeout_seconds() -> u64 {
    30
}

fn default_rejection_message() -> String {
    "Access request rejected due to policy violation".into()
}

/// Connection settings for the Teleport access plane.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TeleportConfig {
    /// Proxy or auth server address (`host:port`, optionally with scheme).
    pub addr: String,
    /// Path to the identity file used to authenticate.
    pub identity: PathBuf,
    /// Reviewer name reported with each deny transition.
    #[serde(default)]
    pub reviewer: Option<String>,
    /// How often the identity file is reloaded; 0 means the default.
    #[serde(default = "default_refresh_seconds")]
    pub identity_refresh_seconds: u64,
}

/// Health endpoint and process lifecycle settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// TCP port the health endpoint listens on; 0 means the default.
    #[serde(default = "default_health_port")]
    pub health_port: u16,
    /// URL path serving the health document.
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Hard deadline for background tasks to stop after a shutdown signal.
    #[serde(default = "default_shutdown_timeout_seconds")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            health_port: default_health_port(),
            health_path: default_health_path(),
            shutdown_timeout_seconds: default_shutdown_timeout_seconds(),
        }
    }
}

/// Rejection policy: the ordered rule list and the fallback message.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RejectionConfig {
    /// Message used when a triggering rule has an empty message.
    #[serde(default = "default_rejection_message")]
    pub default_message: String,
    /// Rules in evaluation order.
    #[serde(default)]
    pub rules: Vec<RejectionRule>,
}

impl Default for RejectionConfig {
    fn default() -> Self {
        Self {
            default_message: default_rejection_message(),
            rules: Vec::new(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Access plane connectivity.
    pub teleport: TeleportConfig,
    /// Health endpoint and shutdown settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Rejection rules.
    #[serde(default)]
    pub rejection: RejectionConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("failed to read config {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string, apply defaults, and validate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Interval between identity reloads.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.teleport.identity_refresh_seconds)
    }

    /// Deadline for background tasks after shutdown is requested.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_seconds)
    }

    /// Socket address the health endpoint binds to (all interfaces).
    #[must_use]
    pub fn health_bind(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.server.health_port))
    }

    /// Explicit zeroes and blanks fall back to the same defaults as
    /// missing keys.
    fn apply_defaults(&mut self) {
        if self.teleport.identity_refresh_seconds == 0 {
            self.teleport.identity_refresh_seconds = default_refresh_seconds();
        }
        if self.server.health_port == 0 {
            self.server.health_port = default_health_port();
        }
        if self.server.health_path.is_empty() {
            self.server.health_path = default_health_path();
        }
        if self.server.shutdown_timeout_seconds == 0 {
            self.server.shutdown_timeout_seconds = default_shutdown_timeout_seconds();
        }
        if self.rejection.default_message.is_empty() {
            self.rejection.default_message = default_rejection_message();
        }
        if self
            .teleport
            .reviewer
            .as_deref()
            .is_some_and(|r| r.trim().is_empty())
        {
            self.teleport.reviewer = None;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.teleport.addr.trim().is_empty() {
            return Err(AppError::Config("teleport.addr must not be empty".into()));
        }

        if self.teleport.identity.as_os_str().is_empty() {
            return Err(AppError::Config(
                "teleport.identity must not be empty".into(),
            ));
        }

        if self.teleport.identity_refresh_seconds > MAX_IDENTITY_REFRESH_SECONDS {
            return Err(AppError::Config(format!(
                "teleport.identity_refresh_seconds must be at most {MAX_IDENTITY_REFRESH_SECONDS}: {}",
                self.teleport.identity_refresh_seconds
            )));
        }

        if !self.server.health_path.starts_with('/') {
            return Err(AppError::Config(format!(
                "server.health_path must start with '/': {}",
                self.server.health_path
            )));
        }

        // Route captures and wildcards would change what the router matches.
        if !is_literal_path(&self.server.health_path) {
            return Err(AppError::Config(format!(
                "server.health_path must be a literal path: {}",
                self.server.health_path
            )));
        }

        if let Some(index) = self
            .rejection
            .rules
            .iter()
            .position(|rule| rule.name.trim().is_empty())
        {
            return Err(AppError::Config(format!(
                "rejection.rules[{index}] must have a name"
            )));
        }

        Ok(())
    }
}

/// Plain URL path: ASCII alphanumerics, `/`, `-`, `_`, `.` and `~` only.
fn is_literal_path(path: &str) -> bool {
    path.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '~'))
}
