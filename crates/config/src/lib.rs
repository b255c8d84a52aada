//! Configuration directory helpers for triage
//!
//! Resolves the shared config directory (`~/.config/triage/` by default,
//! overridable with `TRIAGE_CONFIG_DIR`) and loads JSON files from it.
//!
//! Call [`init`] once at startup to make sure the directory exists.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the config directory
pub const CONFIG_DIR_ENV: &str = "TRIAGE_CONFIG_DIR";

/// Initialize the config directory, creating it if missing.
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// Get the triage config directory
///
/// `TRIAGE_CONFIG_DIR` wins over the platform config directory.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|p| p.join("triage"))
}

/// Get the path to a file within the config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Get the default data directory (`<data dir>/triage`), used for the database
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("triage"))
}

/// Load and parse a JSON file from the config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Check if a file exists in the config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Ensure the config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

/// Save a value as pretty JSON into the config directory
pub fn save_json<T: serde::Serialize>(filename: &str, value: &T) -> Result<()> {
    let dir = ensure_config_dir()?;
    let path = dir.join(filename);
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Sample {
        batch_size: usize,
    }

    #[test]
    fn test_config_path_joins_filename() {
        let path = config_path("triage.json");
        assert!(path.is_some());
        assert!(path.unwrap().ends_with("triage.json"));
    }

    #[test]
    fn test_load_json_file() {
        let dir = std::env::temp_dir().join(format!("triage-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sample.json");
        std::fs::write(&path, r#"{ "batch_size": 42 }"#).unwrap();

        let sample: Sample = load_json_file(&path).unwrap();
        assert_eq!(sample.batch_size, 42);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_json_file_missing() {
        let missing = Path::new("/nonexistent/triage/missing.json");
        assert!(load_json_file::<Sample>(missing).is_err());
    }
}
