//! Settings file resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variables → XDG path → defaults.

use std::path::{Path, PathBuf};

/// Where the settings file was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Resolved settings file path.
#[derive(Debug, Clone, Default)]
pub struct SettingsPath {
    /// Path to relevance.json (or None for built-in defaults).
    pub path: Option<PathBuf>,

    /// Source of the path (for diagnostics).
    pub source: ConfigSource,
}

/// Direct path to a settings file.
pub const ENV_SETTINGS_PATH: &str = "DS_RELEVANCE_CONFIG";
/// Directory containing `relevance.json`.
pub const ENV_CONFIG_DIR: &str = "DS_CONFIG_DIR";

const SETTINGS_FILENAME: &str = "relevance.json";

/// Application name for XDG directories.
const APP_NAME: &str = "downscale-saliency";

/// Resolve the settings file path.
///
/// Resolution order:
/// 1. Explicit CLI path. Returned even if missing so the caller can report it.
/// 2. `DS_RELEVANCE_CONFIG`
/// 3. `DS_CONFIG_DIR` + `relevance.json`
/// 4. XDG config directory (`~/.config/downscale-saliency/relevance.json`)
/// 5. Built-in defaults (None)
pub fn resolve_settings_path(cli_path: Option<&Path>) -> SettingsPath {
    if let Some(path) = cli_path {
        return SettingsPath {
            path: Some(path.to_path_buf()),
            source: ConfigSource::CliArgument,
        };
    }

    if let Ok(env_path) = std::env::var(ENV_SETTINGS_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return SettingsPath {
                path: Some(path),
                source: ConfigSource::Environment,
            };
        }
    }

    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(config_dir).join(SETTINGS_FILENAME);
        if path.exists() {
            return SettingsPath {
                path: Some(path),
                source: ConfigSource::Environment,
            };
        }
    }

    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(SETTINGS_FILENAME);
        if path.exists() {
            return SettingsPath {
                path: Some(path),
                source: ConfigSource::XdgConfig,
            };
        }
    }

    SettingsPath::default()
}

/// Get the XDG config directory for downscale-saliency.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}
