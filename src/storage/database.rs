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


//! Ledger connection and management
//!
//! The [`Ledger`] is an explicitly constructed handle around a SQLite pool.
//! Cloning it is cheap and every clone talks to the same database; the pool
//! serialises writers and every write runs in a transaction, so a handle can
//! be shared freely between the reconciler, the download engine and the
//! deletion manager.
//!
//! # SQLite Configuration
//! - WAL mode for concurrent readers during a write
//! - Normal synchronous mode
//! - 30 second busy timeout

use crate::api::RemoteTrack;
use crate::error::{Result, SyncError};
use crate::storage::models::{LedgerRecord, TrackId};
use crate::storage::queries;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    ConnectOptions,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// File name of the ledger inside the data directory
pub const LEDGER_FILE_NAME: &str = "musicdm.db";

/// Durable track id → download status store
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
    path: Option<PathBuf>, // None for in-memory ledgers
}

impl Ledger {
    /// Open (creating if needed) the ledger at `database_path` and migrate it
    ///
    /// # Errors
    /// Returns error if:
    /// - Parent directory doesn't exist and can't be created
    /// - Database file can't be opened
    /// - Migrations fail
    pub async fn open<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let path = database_path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SyncError::storage(format!(
                        "Failed to create ledger directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let connect_opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_opts)
            .await?;

        let ledger = Self {
            pool,
            path: Some(path.to_path_buf()),
        };
        ledger.migrate().await?;

        log::info!("ledger opened at {}", path.display());

        Ok(ledger)
    }

    /// Create in-memory ledger for testing
    pub async fn open_in_memory() -> Result<Self> {
        let connect_opts = SqliteConnectOptions::from_str("sqlite::memory:")?
            .disable_statement_logging();

        // A second connection would see a different, empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_opts)
            .await?;

        let ledger = Self { pool, path: None };
        ledger.migrate().await?;

        Ok(ledger)
    }

    /// Apply pending migrations
    pub async fn migrate(&self) -> Result<()> {
        crate::storage::migrations::run_migrations(&self.pool)
            .await
            .map_err(|e| SyncError::MigrationFailed(e.to_string()))
    }

    /// Get reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Ledger file path, `None` for in-memory ledgers
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close the ledger and release all connections
    pub async fn close(self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Ledger contract
    // ------------------------------------------------------------------------

    /// Insert or refresh metadata for a catalog snapshot, atomically
    pub async fn upsert_metadata(&self, tracks: &[RemoteTrack]) -> Result<()> {
        queries::upsert_metadata(&self.pool, tracks).await
    }

    /// Record download status for one track, independent of metadata
    pub async fn update_download_status(
        &self,
        id: TrackId,
        is_downloaded: bool,
        local_path: Option<&str>,
        downloaded_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        queries::update_download_status(&self.pool, id, is_downloaded, local_path, downloaded_at)
            .await
    }

    pub async fn fetch_all(&self) -> Result<Vec<LedgerRecord>> {
        queries::fetch_all(&self.pool).await
    }

    pub async fn fetch_downloaded(&self) -> Result<Vec<LedgerRecord>> {
        queries::fetch_downloaded(&self.pool).await
    }

    pub async fn fetch_by_id(&self, id: TrackId) -> Result<Option<LedgerRecord>> {
        queries::fetch_by_id(&self.pool, id).await
    }

    pub async fn count(&self) -> Result<i64> {
        queries::count(&self.pool).await
    }

    /// Explicit per-id removal
    pub async fn remove(&self, id: TrackId) -> Result<bool> {
        queries::remove(&self.pool, id).await
    }

    /// Check database integrity
    pub async fn check_integrity(&self) -> Result<bool> {
        let result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&self.pool)
            .await?;

        Ok(result == "ok")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(id: TrackId, title: &str) -> RemoteTrack {
        RemoteTrack {
            id,
            title: Some(title.to_string()),
            artist: Some("Artist".to_string()),
            stream_url: format!("https://cdn.example.com/stream/{}", id),
            download_url: format!("https://cdn.example.com/download/{}", id),
            album_art: None,
            duration: 200_000,
        }
    }

    #[tokio::test]
    async fn test_upsert_inserts_new_rows() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        ledger
            .upsert_metadata(&[remote(1, "A"), remote(2, "B")])
            .await
            .unwrap();

        let all = ledger.fetch_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "A");
        assert!(!all[0].is_downloaded);
        assert_eq!(all[0].local_path, None);
    }

    #[tokio::test]
    async fn test_metadata_refresh_preserves_download_status() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        ledger.upsert_metadata(&[remote(1, "A")]).await.unwrap();

        let at = Utc::now();
        ledger
            .update_download_status(1, true, Some("/x/1_a.mp3"), Some(at))
            .await
            .unwrap();

        ledger.upsert_metadata(&[remote(1, "A-renamed")]).await.unwrap();
        ledger.upsert_metadata(&[remote(1, "A-again")]).await.unwrap();

        let record = ledger.fetch_by_id(1).await.unwrap().unwrap();
        assert_eq!(record.title, "A-again");
        assert!(record.is_downloaded);
        assert_eq!(record.local_path.as_deref(), Some("/x/1_a.mp3"));
        assert_eq!(record.downloaded_at, Some(at.timestamp_millis()));
    }

    #[tokio::test]
    async fn test_null_title_and_artist_default_to_unknown() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let mut track = remote(7, "ignored");
        track.title = None;
        track.artist = None;
        ledger.upsert_metadata(&[track]).await.unwrap();

        let record = ledger.fetch_by_id(7).await.unwrap().unwrap();
        assert_eq!(record.title, "Unknown");
        assert_eq!(record.artist, "Unknown");
    }

    #[tokio::test]
    async fn test_update_status_for_unknown_id_is_not_found() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let err = ledger
            .update_download_status(42, true, Some("/x/42_a.mp3"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_clearing_status() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        ledger.upsert_metadata(&[remote(1, "A")]).await.unwrap();
        ledger
            .update_download_status(1, true, Some("/x/1_a.mp3"), Some(Utc::now()))
            .await
            .unwrap();
        assert_eq!(ledger.fetch_downloaded().await.unwrap().len(), 1);

        ledger.update_download_status(1, false, None, None).await.unwrap();

        let record = ledger.fetch_by_id(1).await.unwrap().unwrap();
        assert!(!record.is_downloaded);
        assert_eq!(record.local_path, None);
        assert_eq!(record.downloaded_at, None);
        assert!(ledger.fetch_downloaded().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        ledger.upsert_metadata(&[remote(1, "A")]).await.unwrap();

        assert!(ledger.remove(1).await.unwrap());
        assert!(!ledger.remove(1).await.unwrap());
        assert_eq!(ledger.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_ledger_is_an_error_not_empty() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        ledger.upsert_metadata(&[remote(1, "A")]).await.unwrap();
        ledger.pool().close().await;

        let err = ledger.fetch_all().await.unwrap_err();
        assert!(err.is_storage_error());
    }

    #[tokio::test]
    async fn test_file_backed_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(LEDGER_FILE_NAME);

        let ledger = Ledger::open(&path).await.unwrap();
        ledger.upsert_metadata(&[remote(3, "C")]).await.unwrap();
        ledger
            .update_download_status(3, true, Some("/x/3_c.mp3"), Some(Utc::now()))
            .await
            .unwrap();
        ledger.close().await.unwrap();

        let reopened = Ledger::open(&path).await.unwrap();
        let record = reopened.fetch_by_id(3).await.unwrap().unwrap();
        assert!(record.is_downloaded);
        assert!(reopened.check_integrity().await.unwrap());
    }
}
