#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for fwforge
//!
//! One explicit [`Config`] object is constructed at startup — from
//! defaults, an optional TOML file, and environment overrides — and
//! passed by reference into every component. There are no module-level
//! singletons; anything that needs a path or an endpoint receives the
//! config it was built with.

use std::path::{Path, PathBuf};

use fwforge_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub build: BuildConfig,
}

/// Filesystem layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of all mutable data.
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    /// Subdirectory of `data_root` holding per-device build trees.
    #[serde(default = "default_build_root")]
    pub build_root: String,
    /// Directory holding owners' registered SSH private keys.
    #[serde(default = "default_ssh_keys")]
    pub ssh_keys: PathBuf,
    /// Directory the external builder CLI lives in.
    #[serde(default = "default_builder_root")]
    pub builder_root: PathBuf,
    /// Directory holding per-platform descriptor files.
    #[serde(default = "default_platforms_root")]
    pub platforms_root: PathBuf,
}

/// Cloud API endpoint settings embedded into firmware descriptors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_port: Option<u16>,
}

/// MQTT endpoint settings embedded into firmware descriptors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_server")]
    pub server: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
}

/// Keys and shared secrets
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    /// Global transmit key for on-premise installs; an owner-specific
    /// key takes precedence when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmit_key: Option<String>,
    /// Shared secret attached to remote worker jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_secret: Option<String>,
}

/// Build engine behavior
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildConfig {
    /// Allows local execution without a connected worker. Set by the
    /// `ENVIRONMENT=test` override; never enable in production.
    #[serde(default)]
    pub test_mode: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            build_root: default_build_root(),
            ssh_keys: default_ssh_keys(),
            builder_root: default_builder_root(),
            platforms_root: default_platforms_root(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            port: default_api_port(),
            secure_port: None,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            server: default_mqtt_server(),
            port: default_mqtt_port(),
        }
    }
}

fn default_data_root() -> PathBuf {
    PathBuf::from("/mnt/data")
}

fn default_build_root() -> String {
    "repos".to_string()
}

fn default_ssh_keys() -> PathBuf {
    PathBuf::from("/mnt/data/ssh_keys")
}

fn default_builder_root() -> PathBuf {
    PathBuf::from("/opt/fwforge")
}

fn default_platforms_root() -> PathBuf {
    PathBuf::from("/opt/fwforge/platforms")
}

fn default_api_url() -> String {
    "https://api.fwforge.local".to_string()
}

fn default_api_port() -> u16 {
    7442
}

fn default_mqtt_server() -> String {
    "mqtt://mqtt.fwforge.local".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

impl Config {
    /// Load configuration from a TOML file, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or fails to parse.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;
        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides, for installs without a
    /// config file.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Environment overrides: `WORKER_SECRET` keeps the worker secret
    /// out of the config file, `ENVIRONMENT=test` enables local
    /// execution without a worker.
    fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var("WORKER_SECRET") {
            if !secret.is_empty() {
                tracing::debug!("worker secret taken from environment");
                self.security.worker_secret = Some(secret);
            }
        }
        if std::env::var("ENVIRONMENT").as_deref() == Ok("test") {
            tracing::warn!("test mode enabled; local builds allowed without a worker");
            self.build.test_mode = true;
        }
    }

    /// Per-device repository root: `data_root/build_root/owner/udid`.
    #[must_use]
    pub fn device_path(&self, owner: &str, udid: &str) -> PathBuf {
        self.paths
            .data_root
            .join(&self.paths.build_root)
            .join(owner)
            .join(udid)
    }

    /// Filesystem location of one build:
    /// `data_root/build_root/owner/udid/build_id`.
    #[must_use]
    pub fn build_path(&self, owner: &str, udid: &str, build_id: &str) -> PathBuf {
        self.device_path(owner, udid).join(build_id)
    }

    /// Path of the external builder CLI.
    #[must_use]
    pub fn builder_bin(&self) -> PathBuf {
        self.paths.builder_root.join("builder")
    }

    /// Descriptor file for a platform:
    /// `platforms_root/<platform>/descriptor.json`.
    #[must_use]
    pub fn platform_descriptor_path(&self, platform: &str) -> PathBuf {
        self.paths
            .platforms_root
            .join(platform)
            .join("descriptor.json")
    }
}
