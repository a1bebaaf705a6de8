//! Configuration loading and config-file resolution
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use std::path::PathBuf;

/// Resolve a string-valued setting following the priority order above.
///
/// `file_value` is the value already extracted from the TOML config file (if
/// any); passing it in keeps file parsing in one place at startup.
pub fn resolve_setting(
    cli_arg: Option<&str>,
    env_var_name: &str,
    file_value: Option<&str>,
    default: &str,
) -> String {
    if let Some(value) = cli_arg {
        return value.to_string();
    }
    if let Ok(value) = std::env::var(env_var_name) {
        return value;
    }
    if let Some(value) = file_value {
        return value.to_string();
    }
    default.to_string()
}

/// Get the per-platform config file path (`<config dir>/cuedeck/config.toml`).
///
/// On Linux a system-wide `/etc/cuedeck/config.toml` is consulted when no
/// user config exists.
pub fn config_file_path() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("cuedeck").join("config.toml"));

    if let Some(ref path) = user_config {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/cuedeck/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    user_config.ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Load and parse the config file as a TOML table.
///
/// A missing file is not an error (an empty table is returned); a present
/// but unparsable file is.
pub fn load_config_table() -> Result<toml::Table> {
    let path = config_file_path()?;
    if !path.exists() {
        return Ok(toml::Table::new());
    }
    let content = std::fs::read_to_string(&path)?;
    content
        .parse::<toml::Table>()
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Get the default preview cache directory (`<cache dir>/cuedeck/previews`).
pub fn default_preview_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("cuedeck").join("previews"))
        .unwrap_or_else(|| PathBuf::from("./cuedeck_previews"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_arg_wins() {
        let resolved = resolve_setting(
            Some("from-cli"),
            "CUEDECK_TEST_UNSET_VAR",
            Some("from-file"),
            "default",
        );
        assert_eq!(resolved, "from-cli");
    }

    #[test]
    fn test_env_beats_file() {
        std::env::set_var("CUEDECK_TEST_ENV_VAR", "from-env");
        let resolved = resolve_setting(None, "CUEDECK_TEST_ENV_VAR", Some("from-file"), "default");
        assert_eq!(resolved, "from-env");
        std::env::remove_var("CUEDECK_TEST_ENV_VAR");
    }

    #[test]
    fn test_file_beats_default() {
        let resolved = resolve_setting(None, "CUEDECK_TEST_UNSET_VAR", Some("from-file"), "default");
        assert_eq!(resolved, "from-file");
    }

    #[test]
    fn test_default_fallback() {
        let resolved = resolve_setting(None, "CUEDECK_TEST_UNSET_VAR", None, "default");
        assert_eq!(resolved, "default");
    }
}
