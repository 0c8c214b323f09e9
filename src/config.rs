// MusicDM - Offline Music Catalog Sync
// Copyright (C) 2025 MusicDM contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Runtime configuration
//!
//! Loaded from TOML; every key is optional:
//!
//! ```toml
//! catalog_url = "https://music.example.com/songs.json"
//! data_dir = "/home/me/.local/share/musicdm"
//! chunk_size = 65536
//! event_buffer = 16
//! max_concurrent_downloads = 3
//! request_timeout_secs = 300
//! ```

use crate::api::DEFAULT_USER_AGENT;
use crate::download::engine::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use crate::error::{Result, SyncError};
use crate::file::MUSIC_DIR_NAME;
use crate::storage::LEDGER_FILE_NAME;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CATALOG_URL: &str = "http://localhost:8000/songs.json";

/// Sync configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Catalog endpoint returning the JSON track list
    pub catalog_url: String,

    /// Holds the ledger and the `music/` directory
    pub data_dir: PathBuf,

    /// Download writer buffer in bytes
    pub chunk_size: usize,

    /// Download events buffered ahead of the consumer
    pub event_buffer: usize,

    /// Maximum concurrent downloads
    pub max_concurrent_downloads: usize,

    /// Whole-request timeout for the catalog; connect and idle timeout for
    /// payload downloads
    pub request_timeout_secs: u64,

    pub user_agent: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            data_dir: default_data_dir(),
            chunk_size: 64 * 1024,
            event_buffer: 16,
            max_concurrent_downloads: 3,
            request_timeout_secs: 300,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl SyncConfig {
    /// Read and validate a TOML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;

        let config = Self::from_toml(&contents)?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.catalog_url).map_err(|e| {
            SyncError::Configuration(format!("Invalid catalog_url {:?}: {}", self.catalog_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::Configuration(format!(
                "catalog_url must be http or https, got {}",
                url.scheme()
            )));
        }

        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(SyncError::Configuration(format!(
                "chunk_size must be between {} and {} bytes",
                MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
            )));
        }

        if self.event_buffer == 0 {
            return Err(SyncError::Configuration("event_buffer must be at least 1".to_string()));
        }

        if self.max_concurrent_downloads == 0 {
            return Err(SyncError::Configuration(
                "max_concurrent_downloads must be at least 1".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(SyncError::Configuration(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Where payloads are stored
    pub fn music_dir(&self) -> PathBuf {
        self.data_dir.join(MUSIC_DIR_NAME)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE_NAME)
    }
}

/// Platform data directory
///
/// Mobile hosts pass their own app directory instead.
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join("Library")
            .join("Application Support")
            .join("MusicDM")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("MusicDM")
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        match std::env::var("XDG_DATA_HOME") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir).join("musicdm"),
            _ => {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".local").join("share").join("musicdm")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_concurrent_downloads, 3);
        assert!(config.music_dir().ends_with("music"));
        assert!(config.ledger_path().ends_with(LEDGER_FILE_NAME));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml(
            r#"
            catalog_url = "https://music.example.com/songs.json"
            data_dir = "/tmp/musicdm"
            "#,
        )
        .unwrap();

        assert_eq!(config.catalog_url, "https://music.example.com/songs.json");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/musicdm"));
        assert_eq!(config.music_dir(), PathBuf::from("/tmp/musicdm/music"));
        assert_eq!(config.chunk_size, 64 * 1024);
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = SyncConfig::from_toml(r#"catalog_url = "ftp://x/songs.json""#).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));

        let err = SyncConfig::from_toml("chunk_size = 16").unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));

        let err = SyncConfig::from_toml("max_concurrent_downloads = 0").unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));

        let err = SyncConfig::from_toml("chunk_size = \"big\"").unwrap_err();
        assert!(matches!(err, SyncError::Toml(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("musicdm.toml");
        std::fs::write(&path, "event_buffer = 4\n").unwrap();

        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.event_buffer, 4);

        let missing = SyncConfig::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, SyncError::Configuration(_)));
    }
}
