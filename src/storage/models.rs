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


//! Ledger and track models
//!
//! # SQLite Adaptations
//! - Booleans stored as INTEGER (0/1)
//! - `downloadedAt` stored as epoch milliseconds
//! - Column names keep the camelCase of the `songs` table

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::PathBuf;

/// Stable track identity shared by the catalog, the ledger and the filesystem.
pub type TrackId = i64;

/// Display value used when the catalog omits a title or artist.
pub const UNKNOWN: &str = "Unknown";

// ============================================================================
// LEDGER
// ============================================================================

/// One row of the `songs` table
///
/// Metadata columns are owned by catalog refreshes; `is_downloaded`,
/// `local_path` and `downloaded_at` are owned by download/delete completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LedgerRecord {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    #[sqlx(rename = "streamUrl")]
    pub stream_url: String,
    #[sqlx(rename = "downloadUrl")]
    pub download_url: String,
    #[sqlx(rename = "albumArt")]
    pub album_art: Option<String>,
    pub duration: i64,
    #[sqlx(rename = "isDownloaded")]
    pub is_downloaded: bool,
    #[sqlx(rename = "localPath")]
    pub local_path: Option<String>,
    /// Epoch milliseconds
    #[sqlx(rename = "downloadedAt")]
    pub downloaded_at: Option<i64>,
}

impl LedgerRecord {
    /// Download status as recorded on disk
    pub fn status(&self) -> DownloadStatus {
        match (&self.local_path, self.is_downloaded) {
            (Some(path), true) => DownloadStatus::Downloaded {
                local_path: PathBuf::from(path),
                downloaded_at: self.downloaded_at.and_then(millis_to_datetime),
            },
            _ => DownloadStatus::NotDownloaded,
        }
    }

    /// Map a ledger row to a display track (offline view)
    pub fn to_track(&self) -> Track {
        Track {
            id: self.id,
            title: self.title.clone(),
            artist: self.artist.clone(),
            stream_url: self.stream_url.clone(),
            download_url: self.download_url.clone(),
            album_art: self.album_art.clone(),
            duration: self.duration,
            download_status: self.status(),
        }
    }
}

pub(crate) fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

// ============================================================================
// TRACKS
// ============================================================================

/// Download state of a single track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DownloadStatus {
    NotDownloaded,
    /// In flight, percent 0..=100
    Downloading { progress: u8 },
    Downloaded {
        local_path: PathBuf,
        downloaded_at: Option<DateTime<Utc>>,
    },
    Failed { reason: String },
}

impl DownloadStatus {
    pub fn is_downloaded(&self) -> bool {
        matches!(self, DownloadStatus::Downloaded { .. })
    }

    pub fn local_path(&self) -> Option<&PathBuf> {
        match self {
            DownloadStatus::Downloaded { local_path, .. } => Some(local_path),
            _ => None,
        }
    }
}

/// Track descriptor as presented to the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    pub stream_url: String,
    pub download_url: String,
    pub album_art: Option<String>,
    /// Milliseconds
    pub duration: i64,
    pub download_status: DownloadStatus,
}

impl Track {
    pub fn is_downloaded(&self) -> bool {
        self.download_status.is_downloaded()
    }

    /// Where a playback client should read from: the local file when
    /// downloaded, otherwise the stream URL.
    pub fn media_location(&self) -> String {
        match &self.download_status {
            DownloadStatus::Downloaded { local_path, .. } => local_path.display().to_string(),
            _ => self.stream_url.clone(),
        }
    }
}
