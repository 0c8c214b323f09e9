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


//! Ledger query functions
//!
//! Metadata and download status are written by separate statements so that a
//! catalog refresh can never clear a recorded download.
//!
//! # Query Patterns
//! - Free functions over `&SqlitePool`, wrapped by [`Ledger`](super::Ledger)
//! - Batch writes run in a single transaction

use crate::api::RemoteTrack;
use crate::error::{Result, SyncError};
use crate::storage::models::*;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

// ============================================================================
// METADATA
// ============================================================================

/// Insert new rows or refresh metadata of existing ones
///
/// The whole batch is one transaction: either every descriptor is applied or
/// none is. Status columns of existing rows are left untouched.
pub async fn upsert_metadata(pool: &SqlitePool, tracks: &[RemoteTrack]) -> Result<()> {
    let mut tx = pool.begin().await?;

    for track in tracks {
        sqlx::query(
            r#"
            INSERT INTO songs (id, title, artist, streamUrl, downloadUrl, albumArt, duration)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                streamUrl = excluded.streamUrl,
                downloadUrl = excluded.downloadUrl,
                albumArt = excluded.albumArt,
                duration = excluded.duration
            "#,
        )
        .bind(track.id)
        .bind(track.display_title())
        .bind(track.display_artist())
        .bind(&track.stream_url)
        .bind(&track.download_url)
        .bind(&track.album_art)
        .bind(track.duration)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    log::debug!("ledger metadata upserted for {} tracks", tracks.len());

    Ok(())
}

// ============================================================================
// DOWNLOAD STATUS
// ============================================================================

/// Point update of the download status columns
///
/// Returns `NotFound` when no row exists for `id`.
pub async fn update_download_status(
    pool: &SqlitePool,
    id: TrackId,
    is_downloaded: bool,
    local_path: Option<&str>,
    downloaded_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE songs SET isDownloaded = ?, localPath = ?, downloadedAt = ? WHERE id = ?",
    )
    .bind(is_downloaded)
    .bind(local_path)
    .bind(downloaded_at.map(|at| at.timestamp_millis()))
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(SyncError::not_found(format!("track {} in ledger", id)));
    }

    tx.commit().await?;

    Ok(())
}

// ============================================================================
// READS
// ============================================================================

/// Full snapshot of the ledger, ordered by id
pub async fn fetch_all(pool: &SqlitePool) -> Result<Vec<LedgerRecord>> {
    let records = sqlx::query_as::<_, LedgerRecord>("SELECT * FROM songs ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(records)
}

/// Rows that have a recorded download
pub async fn fetch_downloaded(pool: &SqlitePool) -> Result<Vec<LedgerRecord>> {
    let records =
        sqlx::query_as::<_, LedgerRecord>("SELECT * FROM songs WHERE isDownloaded = 1 ORDER BY id")
            .fetch_all(pool)
            .await?;

    Ok(records)
}

/// Find a single row by id
pub async fn fetch_by_id(pool: &SqlitePool, id: TrackId) -> Result<Option<LedgerRecord>> {
    let record = sqlx::query_as::<_, LedgerRecord>("SELECT * FROM songs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(record)
}

/// Count rows
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM songs")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

// ============================================================================
// REMOVAL
// ============================================================================

/// Delete a row. Returns whether a row existed.
pub async fn remove(pool: &SqlitePool, id: TrackId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM songs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
