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


//! Removal of downloaded payloads
//!
//! # Algorithm
//! 1. List every `<id>_*` file in the music directory
//! 2. No match: report failure, ledger untouched
//! 3. No ledger row for `id`: `NotFound`, nothing removed
//! 4. Remove each match (with retry); any failure: report failure, ledger untouched
//! 5. All removed: clear the ledger's download status for `id`

use crate::error::{Result, SyncError};
use crate::file::paths::find_payloads;
use crate::storage::{Ledger, TrackId};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::time::sleep;

/// Maximum retry attempts for a single file removal
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Deletes payload files and keeps the ledger in step
#[derive(Debug, Clone)]
pub struct DeletionManager {
    music_dir: PathBuf,
    ledger: Ledger,
}

impl DeletionManager {
    pub fn new(music_dir: PathBuf, ledger: Ledger) -> Self {
        Self { music_dir, ledger }
    }

    pub fn music_dir(&self) -> &Path {
        &self.music_dir
    }

    /// Delete every payload of `id`
    ///
    /// Returns `Ok(false)` when nothing matched or a file could not be
    /// removed; the ledger is only updated when every file is gone. An error
    /// is returned when the directory cannot be listed, when the ledger has
    /// no row for `id` (before any file is touched), or when the ledger
    /// update fails after the files are gone.
    pub async fn delete(&self, id: TrackId) -> Result<bool> {
        let files = find_payloads(&self.music_dir, id).await?;

        if files.is_empty() {
            log::warn!("delete requested for track {} but no payload exists", id);
            return Ok(false);
        }

        if self.ledger.fetch_by_id(id).await?.is_none() {
            return Err(SyncError::not_found(format!("track {} in ledger", id)));
        }

        let mut all_removed = true;
        for path in &files {
            if let Err(e) = Self::safe_delete(path).await {
                log::error!("{}", e);
                all_removed = false;
            }
        }

        if !all_removed {
            return Ok(false);
        }

        self.ledger.update_download_status(id, false, None, None).await?;
        log::info!("deleted {} payload file(s) for track {}", files.len(), id);

        Ok(true)
    }

    /// Like [`delete`](Self::delete) but a missing payload is an error
    pub async fn delete_strict(&self, id: TrackId) -> Result<()> {
        if find_payloads(&self.music_dir, id).await?.is_empty() {
            return Err(SyncError::not_found(format!("payload for track {}", id)));
        }
        if self.delete(id).await? {
            Ok(())
        } else {
            Err(SyncError::storage(format!(
                "Could not remove every payload file for track {}",
                id
            )))
        }
    }

    /// Payload of `id` for handing to a playback client
    ///
    /// The ledger's recorded path wins while that file exists; otherwise the
    /// first `<id>_*` file.
    pub async fn locate(&self, id: TrackId) -> Result<Option<PathBuf>> {
        let recorded = self
            .ledger
            .fetch_by_id(id)
            .await?
            .and_then(|record| record.status().local_path().cloned());

        if let Some(path) = recorded {
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(Some(path));
            }
        }

        Ok(find_payloads(&self.music_dir, id).await?.into_iter().next())
    }

    /// Remove a file, retrying transient failures
    async fn safe_delete(path: &Path) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match fs::remove_file(path).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) if attempts >= MAX_RETRY_ATTEMPTS => {
                    return Err(SyncError::storage(format!(
                        "Failed to delete file after {} attempts: {}: {}",
                        MAX_RETRY_ATTEMPTS,
                        path.display(),
                        e
                    )));
                }
                Err(_) => {
                    sleep(RETRY_DELAY).await;
                    continue;
                }
            }
        }
    }
}
