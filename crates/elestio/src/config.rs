use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::deploy::DeployTiming;

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".config/elestio/config.json";
const DEFAULT_SSH_KEY_RELATIVE_PATH: &str = ".ssh/elestio_cli_ed25519";

const DEFAULT_API_URL: &str = "https://api.elest.io";
const DEFAULT_SSH_USER: &str = "root";

const DEFAULT_KEY_SETTLE_SECONDS: u64 = 10;
const DEFAULT_INIT_POLL_ATTEMPTS: u32 = 12;
const DEFAULT_INIT_POLL_INTERVAL_SECONDS: u64 = 10;
const DEFAULT_PROBE_SETTLE_SECONDS: u64 = 5;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ElestioConfig {
    pub email: Option<String>,
    pub api_token: Option<String>,
    pub project_id: Option<String>,
    pub api_url: Option<String>,
    pub ssh: SshConfig,
    pub deploy: DeployConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub key_path: Option<String>,
    pub user: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub key_settle_seconds: Option<u64>,
    pub init_poll_attempts: Option<u32>,
    pub init_poll_interval_seconds: Option<u64>,
    pub probe_settle_seconds: Option<u64>,
}

impl ElestioConfig {
    /// Loads the JSON config file, or defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ELESTIO_CONFIG_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map_or_else(
                || home_dir().join(DEFAULT_CONFIG_RELATIVE_PATH),
                PathBuf::from,
            );

        Self::load_from(&config_path)
    }

    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = serde_json::from_str::<Self>(&raw)
            .with_context(|| format!("Failed to parse config JSON: {}", path.display()))?;

        Ok(config)
    }

    #[must_use]
    pub fn email(&self) -> Option<String> {
        non_empty_or_env(self.email.as_deref(), "ELESTIO_EMAIL")
    }

    #[must_use]
    pub fn api_token(&self) -> Option<String> {
        non_empty_or_env(self.api_token.as_deref(), "ELESTIO_API_TOKEN")
    }

    #[must_use]
    pub fn project_id(&self) -> Option<String> {
        non_empty_or_env(self.project_id.as_deref(), "ELESTIO_PROJECT_ID")
    }

    #[must_use]
    pub fn api_url(&self) -> String {
        non_empty_or_env(self.api_url.as_deref(), "ELESTIO_API_URL")
            .map_or_else(
                || DEFAULT_API_URL.to_string(),
                |value| value.trim_end_matches('/').to_string(),
            )
    }

    #[must_use]
    pub fn ssh_key_path(&self) -> PathBuf {
        non_empty_or_env(self.ssh.key_path.as_deref(), "ELESTIO_SSH_KEY_PATH").map_or_else(
            || home_dir().join(DEFAULT_SSH_KEY_RELATIVE_PATH),
            PathBuf::from,
        )
    }

    #[must_use]
    pub fn ssh_user(&self) -> String {
        non_empty_or_env(self.ssh.user.as_deref(), "ELESTIO_SSH_USER")
            .unwrap_or_else(|| DEFAULT_SSH_USER.to_string())
    }

    #[must_use]
    pub fn deploy_timing(&self) -> DeployTiming {
        DeployTiming {
            key_settle: Duration::from_secs(
                self.deploy
                    .key_settle_seconds
                    .unwrap_or(DEFAULT_KEY_SETTLE_SECONDS),
            ),
            init_poll_attempts: self
                .deploy
                .init_poll_attempts
                .unwrap_or(DEFAULT_INIT_POLL_ATTEMPTS)
                .max(1),
            init_poll_interval: Duration::from_secs(
                self.deploy
                    .init_poll_interval_seconds
                    .unwrap_or(DEFAULT_INIT_POLL_INTERVAL_SECONDS),
            ),
            probe_settle: Duration::from_secs(
                self.deploy
                    .probe_settle_seconds
                    .unwrap_or(DEFAULT_PROBE_SETTLE_SECONDS),
            ),
        }
    }
}

fn non_empty_or_env(value: Option<&str>, env_key: &str) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .or_else(|| {
            std::env::var(env_key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME").map_or_else(|| PathBuf::from("/root"), PathBuf::from)
}
