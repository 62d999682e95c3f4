use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::common::config::AppConfig;

/// Write the resolved config path to provided writer.
pub(super) fn path_config_with_writer(path: &Path, output: &mut dyn Write) -> Result<()> {
    writeln!(output, "{}", path.display())?;
    Ok(())
}

/// Print the effective (merged) config as TOML, secrets masked.
/// A note about the missing file goes to stderr so stdout stays valid TOML.
pub(super) fn show_config_with_io(
    config: &AppConfig,
    path: &Path,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<()> {
    if !path.exists() {
        writeln!(stderr, "No config file found at {}", path.display())?;
        writeln!(
            stderr,
            "Showing defaults merged with FTPRELAY_* environment variables."
        )?;
    }

    let text = toml::to_string_pretty(&config.redacted())
        .context("Failed to serialize effective config")?;
    stdout.write_all(text.as_bytes())?;
    Ok(())
}
