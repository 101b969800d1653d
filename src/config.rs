use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CATALOG_URL: &str = "https://api.steampowered.com/ISteamApps/GetAppList/v2/";
pub const DEFAULT_METADATA_URL: &str = "https://store.steampowered.com/api/appdetails";

#[cfg(windows)]
const DEFAULT_HOST_EXECUTABLE: &str = "steam.exe";
#[cfg(not(windows))]
const DEFAULT_HOST_EXECUTABLE: &str = "steam";

const DEFAULT_COMPANION_EXECUTABLE: &str = "SteamTools.exe";

/// Runtime settings.
///
/// Loaded from `{config_dir}/st-app-adder/settings.json` when the file exists.
/// Every field is optional in the file; missing ones fall back to [`Settings::default`].
///
/// Example:
/// `{ "archive_base_url": "https://files.example.net/apps", "restart_services": false }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub catalog_url: String,
    pub metadata_url: String,
    /// Static host serving `{archive_base_url}/{app_id}.zip`. No default.
    pub archive_base_url: Option<String>,
    pub staging_dir: Option<PathBuf>,
    /// Skips installation root probing when set.
    pub install_root: Option<PathBuf>,
    /// Skips companion tool probing when set.
    pub companion_path: Option<PathBuf>,
    pub host_executable: String,
    pub companion_executable: String,

    pub catalog_timeout_secs: u64,
    pub metadata_timeout_secs: u64,
    pub archive_timeout_secs: u64,

    pub stop_settle_ms: u64,
    pub companion_settle_ms: u64,
    pub start_settle_ms: u64,

    pub restart_services: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            metadata_url: DEFAULT_METADATA_URL.to_string(),
            archive_base_url: None,
            staging_dir: None,
            install_root: None,
            companion_path: None,
            host_executable: DEFAULT_HOST_EXECUTABLE.to_string(),
            companion_executable: DEFAULT_COMPANION_EXECUTABLE.to_string(),
            catalog_timeout_secs: 15,
            metadata_timeout_secs: 10,
            archive_timeout_secs: 30,
            stop_settle_ms: 2000,
            companion_settle_ms: 4000,
            start_settle_ms: 1000,
            restart_services: true,
        }
    }
}

pub fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("st-app-adder").join("settings.json"))
}

impl Settings {
    /// Reads `path`, or the default settings location when `path` is `None`.
    ///
    /// A missing file is not an error. A file that exists but does not parse is.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match settings_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            log::info!("no settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|e| e.to_string())?;
        let settings: Self = serde_json::from_str(&text)
            .map_err(|e| format!("invalid settings file {}: {e}", path.display()))?;
        log::info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn staging_root(&self) -> PathBuf {
        if let Some(dir) = &self.staging_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("st-app-adder")
            .join("staging")
    }

    /// Problems that let the tool start but will fail every install.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = vec![];
        if self.archive_base_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
            warnings.push(
                "archive_base_url is not set; downloads will fail until it is configured \
                 (settings.json or --archive-base)"
                    .to_string(),
            );
        }
        warnings
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog_timeout_secs)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn archive_timeout(&self) -> Duration {
        Duration::from_secs(self.archive_timeout_secs)
    }
}
