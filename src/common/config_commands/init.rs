//! Writing a starter config file.

use super::defaults_toml;
use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

/// Write the default config to `path`. Refuses to clobber an existing file
/// unless `force` is set.
pub(super) fn init_config_with_io(path: &Path, force: bool, output: &mut dyn Write) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file already exists at {}. Use --force to overwrite",
            path.display()
        );
    }

    write_replacing(path, &defaults_toml()?)?;
    writeln!(output, "Wrote default config to {}", path.display())?;
    writeln!(
        output,
        "Set server.api_token and remote.host before running `ftprelay serve`."
    )?;
    Ok(())
}

// Sibling temp file + rename, so a crash never leaves a half-written config
fn write_replacing(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }

    let base_name = path
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or("config.toml");
    let tmp_path = path.with_file_name(format!(".{base_name}.{}.tmp", Uuid::new_v4()));

    let written = fs::File::create(&tmp_path)
        .and_then(|mut file| {
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&tmp_path, path));

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e).with_context(|| format!("Failed to write config file {}", path.display()));
    }

    Ok(())
}
