//! Bootstrap configuration file resolution
//!
//! Resolution priority for the config file path:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`~/.config/lullaby/config.toml`, and on Linux
//!    `/etc/lullaby/config.toml`)
//! 4. None: callers fall back to compiled defaults

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "LULLABY_CONFIG";

/// File name looked up inside the platform config directories
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Resolve which config file to read, if any
///
/// CLI and environment paths are returned even when the file does not exist,
/// so the caller can warn about an explicit path that is missing. Platform
/// locations are only returned when present on disk.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    app_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    platform_config_candidates(app_name)
        .into_iter()
        .find(|candidate| candidate.exists())
}

/// Config file locations checked for `app_name`, most specific first
pub fn platform_config_candidates(app_name: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(app_name).join(CONFIG_FILE_NAME));
    }

    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc").join(app_name).join(CONFIG_FILE_NAME));
    }

    candidates
}

/// Parse a TOML document into `T`
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    Ok(toml::from_str(content)?)
}

/// Read `path` as TOML, degrading to `T::default()` when it is missing
///
/// A missing file is not fatal: it is logged as a warning and defaults are
/// used. A file that exists but fails to parse is a hard `Config` error, since
/// silently ignoring a typo would hide the user's intent.
pub fn read_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        debug!("No config file located, using built-in defaults");
        return Ok(T::default());
    };

    match std::fs::read_to_string(path) {
        Ok(content) => parse_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Config file {} not found, using defaults", path.display());
            Ok(T::default())
        }
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_path_wins_even_if_missing() {
        let cli = PathBuf::from("/nonexistent/lullaby.toml");
        let resolved = resolve_config_path(Some(&cli), "LULLABY_UNIT_TEST_UNSET", "lullaby");
        assert_eq!(resolved, Some(cli));
    }

    #[test]
    fn test_candidates_end_with_file_name() {
        for candidate in platform_config_candidates("lullaby") {
            assert!(candidate.ends_with("lullaby/config.toml"));
        }
    }
}
