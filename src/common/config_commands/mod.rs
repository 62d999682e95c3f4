//! CLI handlers for config subcommands.

mod init;
mod show;

use crate::common::config::{config_path, resolve_config, AppConfig, ConfigOverrides};
use anyhow::{Context, Result};

fn defaults_toml() -> Result<String> {
    toml::to_string_pretty(&AppConfig::default()).context("Failed to serialize default config")
}

/// Print resolved config file path.
pub fn run_config_path(overrides: &ConfigOverrides) -> Result<()> {
    let path = overrides.config_file.clone().unwrap_or_else(config_path);
    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    show::path_config_with_writer(&path, &mut output)
}

/// Print the effective config (file + env merged over defaults), secrets masked.
pub fn run_config_show(overrides: &ConfigOverrides) -> Result<()> {
    let path = overrides.config_file.clone().unwrap_or_else(config_path);
    // Not validated: show is how people find out what's missing
    let config = resolve_config(overrides)?;

    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    let stderr = std::io::stderr();
    let mut err_output = stderr.lock();
    show::show_config_with_io(&config, &path, &mut output, &mut err_output)
}

/// Write a starter config file.
pub fn run_config_init(overrides: &ConfigOverrides, force: bool) -> Result<()> {
    let path = overrides.config_file.clone().unwrap_or_else(config_path);
    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    init::init_config_with_io(&path, force, &mut output)
}
