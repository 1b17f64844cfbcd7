//! Configuration for the tinyq server and worker.
//!
//! Loaded from `tinyq.toml`; every field has a default, so an empty or
//! missing file yields a working development setup:
//!
//! ```toml
//! [server]
//! root = "/var/lib/tinyq"   # default: ~/.tinyq/data (TINYQ_HOME overrides ~/.tinyq)
//! port = 8080
//! default_app = "default"
//! stats_buffer = 100
//! log_level = "info"
//! metrics = true
//!
//! [worker]
//! url = "http://localhost:8080"
//! app = "default"
//! backoff_ms = 2000
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::daemon::paths;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// tinyq.toml configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub worker: WorkerConfig,
}

/// Server settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Store directory. `None` means `~/.tinyq/data`.
    pub root: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    /// Application used when a request has no `app` parameter.
    pub default_app: String,
    /// Capacity of the statistics buffer.
    pub stats_buffer: usize,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Expose `/metrics` in Prometheus format.
    pub metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: None,
            host: "0.0.0.0".to_string(),
            port: constants::DEFAULT_PORT,
            default_app: constants::DEFAULT_APPLICATION.to_string(),
            stats_buffer: constants::DEFAULT_STATS_BUFFER,
            log_level: "info".to_string(),
            metrics: true,
        }
    }
}

impl ServerConfig {
    /// Resolved store directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no root is configured and the home directory
    /// cannot be determined.
    pub fn root_dir(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => paths::get_data_dir(),
        }
    }
}

/// Worker and client settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub url: String,
    pub app: String,
    /// Opaque token forwarded as the `token` query parameter.
    pub token: Option<String>,
    pub backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            url: constants::DEFAULT_SERVER_URL.to_string(),
            app: constants::DEFAULT_APPLICATION.to_string(),
            token: None,
            backoff_ms: constants::DEFAULT_BACKOFF_MS,
        }
    }
}

impl WorkerConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Config {
    /// Load `~/.tinyq/tinyq.toml`, or defaults if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = paths::get_config_path()?;
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Fields have invalid types
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails with one or more errors:
    /// - Port 0
    /// - Empty default application or stats buffer of 0
    /// - Worker URL that doesn't parse
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Server
        if self.server.port == 0 {
            errors.push(
                "Server port cannot be 0. Use a valid port number (1-65535)".to_string(),
            );
        } else if self.server.port < 1024 {
            warnings.push(format!(
                "Server port {} is a system/privileged port (< 1024)\n  \
                 Recommendation: Use ports >= 1024 (e.g., 8080) to avoid permission issues",
                self.server.port
            ));
        }

        if self.server.default_app.is_empty() {
            errors.push("server.default_app cannot be empty".to_string());
        }

        if self.server.stats_buffer == 0 {
            errors.push(
                "server.stats_buffer cannot be 0. Set a positive number (default: 100)"
                    .to_string(),
            );
        }

        if let Some(root) = &self.server.root
            && root.exists()
            && !root.is_dir()
        {
            errors.push(format!(
                "server.root is not a directory: {}",
                root.display()
            ));
        }

        // 2. Worker
        if url::Url::parse(&self.worker.url).is_err() {
            errors.push(format!("worker.url is not a valid URL: '{}'", self.worker.url));
        }

        if self.worker.backoff_ms == 0 {
            warnings.push(
                "worker.backoff_ms is 0: idle workers will poll without pause".to_string(),
            );
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}
