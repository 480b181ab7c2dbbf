// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{DEFAULT_ALBUM, PICTURES_COLLECTION};
use crate::errors::{AppError, AppResult, TimedOperation};
use crate::storage::StorageMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Optional bounds on asynchronous camera operations, in milliseconds
///
/// `None` waits indefinitely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Camera-open callback
    pub open_ms: Option<u64>,
    /// Session-configured callback
    pub configure_ms: Option<u64>,
    /// Still capture completion and pairing
    pub capture_ms: Option<u64>,
}

impl Timeouts {
    pub fn get(&self, operation: TimedOperation) -> Option<Duration> {
        let ms = match operation {
            TimedOperation::Open => self.open_ms,
            TimedOperation::Configure => self.configure_ms,
            TimedOperation::Capture => self.capture_ms,
        };
        ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera to open; the primary camera when unset
    pub camera_id: Option<String>,
    /// Where DNG files are written
    pub storage_mode: StorageMode,
    /// Album folder under Pictures
    pub album_name: String,
    /// Directory for direct writes; `<pictures>/<album>` when unset
    pub output_dir: Option<PathBuf>,
    /// Media catalog location; no catalog when unset
    pub catalog_root: Option<PathBuf>,
    pub timeouts: Timeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_id: None,
            storage_mode: StorageMode::Auto,
            album_name: DEFAULT_ALBUM.to_string(),
            output_dir: None,
            catalog_root: None,
            timeouts: Timeouts::default(),
        }
    }
}

impl Config {
    /// `<config dir>/rawcapture/config.json`
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rawcapture").join("config.json"))
    }

    /// Load the user config, falling back to defaults when it is missing or
    /// unreadable
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            debug!("No config directory, using defaults");
            return Self::default();
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Config(format!("{}: {}", parent.display(), e)))?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Directory for direct writes
    pub fn direct_dir(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => pictures_dir().join(&self.album_name),
        }
    }
}

/// The user's pictures directory, or a `Pictures` folder in home
pub fn pictures_dir() -> PathBuf {
    dirs::picture_dir().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(PICTURES_COLLECTION)
    })
}
