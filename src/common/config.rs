//! Configuration schema, defaults, and layered loading.
//!
//! Precedence: defaults < config file < environment < CLI
use anyhow::{ensure, Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "FTPRELAY_";
const MAX_TIMEOUT_MS: u64 = 10 * 60 * 1000;
const REDACTED: &str = "********";

pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "ftprelay")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("ftprelay.toml"))
}

/// How the control and data connections to the FTP server are secured.
///
/// Both TLS modes accept any server certificate (self-signed included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    Plain,
    /// `AUTH TLS` upgrade after the greeting.
    #[default]
    Explicit,
    /// TLS from the first byte, usually port 990.
    Implicit,
}

impl SecurityMode {
    pub fn is_tls(self) -> bool {
        !matches!(self, SecurityMode::Plain)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Requests allowed per client IP in one window
    pub requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests: 100,
            window_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub port: u16,
    /// Shared secret expected in `Authorization: Bearer <token>`
    pub api_token: String,
    pub max_body_bytes: usize,
    pub rate_limit: RateLimitSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
            api_token: String::new(),
            max_body_bytes: 50 * 1024 * 1024,
            rate_limit: RateLimitSettings::default(),
        }
    }
}

/// Connection parameters for the remote FTP endpoint. Read-only after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub security: SecurityMode,
    /// Inactivity timeout for control replies and data reads/writes
    pub timeout_ms: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 21,
            user: "anonymous".to_string(),
            password: String::new(),
            security: SecurityMode::Explicit,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StagingSettings {
    /// Defaults to `<system tmp>/ftprelay` when unset
    pub dir: Option<PathBuf>,
}

impl StagingSettings {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("ftprelay"))
    }
}

/// Small-payload HTML detection used to reject web pages posing as files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SniffSettings {
    pub enabled: bool,
    /// Payloads larger than this are never sniffed
    pub max_bytes: u64,
}

impl Default for SniffSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: 1024,
        }
    }
}

/// Fully resolved application configuration after all layers merge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub remote: RemoteSettings,
    pub staging: StagingSettings,
    pub sniff: SniffSettings,
}

impl AppConfig {
    /// Rejects configs the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.server.api_token.trim().is_empty(),
            "Invalid config: server.api_token must be set"
        );
        ensure!(
            self.server.max_body_bytes > 0,
            "Invalid config: server.max_body_bytes must be > 0"
        );
        ensure!(
            self.server.rate_limit.requests >= 1,
            "Invalid config: server.rate_limit.requests must be >= 1"
        );
        ensure!(
            self.server.rate_limit.window_secs >= 1,
            "Invalid config: server.rate_limit.window_secs must be >= 1"
        );
        ensure!(
            !self.remote.host.trim().is_empty(),
            "Invalid config: remote.host must be set"
        );
        ensure!(self.remote.port > 0, "Invalid config: remote.port must be > 0");
        ensure!(
            self.remote.timeout_ms > 0,
            "Invalid config: remote.timeout_ms must be > 0"
        );
        ensure!(
            self.remote.timeout_ms <= MAX_TIMEOUT_MS,
            "Invalid config: remote.timeout_ms must be <= {MAX_TIMEOUT_MS}"
        );
        Ok(())
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.server.api_token.is_empty() {
            config.server.api_token = REDACTED.to_string();
        }
        if !config.remote.password.is_empty() {
            config.remote.password = REDACTED.to_string();
        }
        config
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub port: Option<u16>,
}

fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Merges defaults/file/env/CLI without validating.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<AppConfig> {
    let path = overrides.config_file.clone().unwrap_or_else(config_path);

    let config: AppConfig = figment_for(&path)
        .extract()
        .context("Failed to load configuration")?;

    Ok(apply_overrides(config, overrides))
}

/// Loads and validates config from defaults/file/env/CLI.
pub fn load_config(overrides: &ConfigOverrides) -> Result<AppConfig> {
    let config = resolve_config(overrides)?;
    config.validate()?;
    Ok(config)
}

/// Applies runtime overrides to a loaded config.
pub fn apply_overrides(mut config: AppConfig, overrides: &ConfigOverrides) -> AppConfig {
    if let Some(port) = overrides.port {
        config.server.port = port;
    }

    config
}
