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


//! Catalog/ledger reconciliation
//!
//! # Merge rule
//! - Display fields (title, artist, URLs, art, duration) come from the catalog
//! - Status fields (downloaded, local path, timestamp) come from the ledger
//! - Catalog order is kept; the offline view is ordered by id
//!
//! A catalog that cannot be reached is not an error: the caller gets the
//! ledger contents, tagged [`ViewOrigin::Offline`]. Ledger failures always
//! propagate.

use crate::api::{CatalogSource, RemoteTrack};
use crate::error::Result;
use crate::storage::{DownloadStatus, Ledger, LedgerRecord, Track, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which tracks a view includes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    All,
    DownloadedOnly,
}

impl ViewMode {
    fn admits(self, track: &Track) -> bool {
        match self {
            ViewMode::All => true,
            ViewMode::DownloadedOnly => track.is_downloaded(),
        }
    }
}

/// Where a view's contents came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum ViewOrigin {
    /// Fresh catalog merged with the ledger
    Remote,
    /// Ledger only; `reason` says why the catalog was not used
    Offline { reason: Option<String> },
}

/// Snapshot handed to the UI layer. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedView {
    pub tracks: Vec<Track>,
    pub origin: ViewOrigin,
}

impl UnifiedView {
    pub fn is_offline(&self) -> bool {
        matches!(self.origin, ViewOrigin::Offline { .. })
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }
}

/// Merges the catalog with the ledger
pub struct Reconciler<C> {
    source: C,
    ledger: Ledger,
}

impl<C: CatalogSource> Reconciler<C> {
    pub fn new(source: C, ledger: Ledger) -> Self {
        Self { source, ledger }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn source(&self) -> &C {
        &self.source
    }

    /// Fetch the catalog, record its metadata and return the merged view
    ///
    /// Falls back to [`Reconciler::offline_view`] when the catalog fails.
    pub async fn refresh(&self, mode: ViewMode) -> Result<UnifiedView> {
        let remote = match self.source.fetch_catalog().await {
            Ok(remote) => remote,
            Err(e) if e.is_storage_error() => return Err(e),
            Err(e) => {
                log::warn!("catalog unavailable, serving ledger: {}", e);
                let mut view = self.offline_view(mode).await?;
                view.origin = ViewOrigin::Offline {
                    reason: Some(e.user_message()),
                };
                return Ok(view);
            }
        };

        let known: HashMap<TrackId, LedgerRecord> = self
            .ledger
            .fetch_all()
            .await?
            .into_iter()
            .map(|record| (record.id, record))
            .collect();

        self.ledger.upsert_metadata(&remote).await?;

        let tracks: Vec<Track> = remote
            .iter()
            .map(|r| merge_track(r, known.get(&r.id)))
            .filter(|t| mode.admits(t))
            .collect();

        log::debug!(
            "merged {} catalog tracks against {} ledger records",
            remote.len(),
            known.len()
        );

        Ok(UnifiedView {
            tracks,
            origin: ViewOrigin::Remote,
        })
    }

    /// Ledger contents only, no network
    pub async fn offline_view(&self, mode: ViewMode) -> Result<UnifiedView> {
        let tracks = self
            .ledger
            .fetch_all()
            .await?
            .iter()
            .map(LedgerRecord::to_track)
            .filter(|t| mode.admits(t))
            .collect();

        Ok(UnifiedView {
            tracks,
            origin: ViewOrigin::Offline { reason: None },
        })
    }
}

fn merge_track(remote: &RemoteTrack, record: Option<&LedgerRecord>) -> Track {
    Track {
        id: remote.id,
        title: remote.display_title().to_string(),
        artist: remote.display_artist().to_string(),
        stream_url: remote.stream_url.clone(),
        download_url: remote.download_url.clone(),
        album_art: remote.album_art.clone(),
        duration: remote.duration,
        download_status: record
            .map(LedgerRecord::status)
            .unwrap_or(DownloadStatus::NotDownloaded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use chrono::Utc;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// `None` answers with a connection error
    struct FakeCatalog(Mutex<Option<Vec<RemoteTrack>>>);

    impl FakeCatalog {
        fn serving(tracks: Vec<RemoteTrack>) -> Self {
            Self(Mutex::new(Some(tracks)))
        }

        fn offline() -> Self {
            Self(Mutex::new(None))
        }

        fn set(&self, tracks: Option<Vec<RemoteTrack>>) {
            *self.0.lock().unwrap() = tracks;
        }
    }

    impl CatalogSource for FakeCatalog {
        async fn fetch_catalog(&self) -> Result<Vec<RemoteTrack>> {
            self.0
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| SyncError::network_error("connection refused", true))
        }
    }

    fn remote(id: TrackId, title: Option<&str>) -> RemoteTrack {
        RemoteTrack {
            id,
            title: title.map(str::to_string),
            artist: None,
            stream_url: format!("https://cdn.example.com/s/{}", id),
            download_url: format!("https://cdn.example.com/d/{}", id),
            album_art: None,
            duration: 1_000,
        }
    }

    #[tokio::test]
    async fn test_first_sync_is_not_downloaded() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let reconciler = Reconciler::new(FakeCatalog::serving(vec![remote(1, Some("A"))]), ledger);

        let view = reconciler.refresh(ViewMode::All).await.unwrap();

        assert_eq!(view.origin, ViewOrigin::Remote);
        assert_eq!(view.len(), 1);
        assert_eq!(view.tracks[0].title, "A");
        assert_eq!(view.tracks[0].artist, "Unknown");
        assert_eq!(view.tracks[0].download_status, DownloadStatus::NotDownloaded);
        assert_eq!(reconciler.ledger().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rename_keeps_download_state() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        ledger.upsert_metadata(&[remote(1, Some("A"))]).await.unwrap();
        ledger
            .update_download_status(1, true, Some("/x/1_a.mp3"), Some(Utc::now()))
            .await
            .unwrap();

        let reconciler = Reconciler::new(FakeCatalog::serving(vec![remote(1, Some("A2"))]), ledger);
        let view = reconciler.refresh(ViewMode::All).await.unwrap();

        let track = view.get(1).unwrap();
        assert_eq!(track.title, "A2");
        assert!(track.is_downloaded());
        assert_eq!(track.download_status.local_path(), Some(&PathBuf::from("/x/1_a.mp3")));

        let record = reconciler.ledger().fetch_by_id(1).await.unwrap().unwrap();
        assert_eq!(record.title, "A2");
        assert!(record.is_downloaded);
    }

    #[tokio::test]
    async fn test_network_failure_serves_ledger() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let catalog = FakeCatalog::serving(vec![remote(2, Some("B")), remote(1, Some("A"))]);
        let reconciler = Reconciler::new(catalog, ledger);
        reconciler.refresh(ViewMode::All).await.unwrap();

        reconciler.source().set(None);
        let fallback = reconciler.refresh(ViewMode::All).await.unwrap();
        let offline = reconciler.offline_view(ViewMode::All).await.unwrap();

        assert!(fallback.is_offline());
        assert!(matches!(fallback.origin, ViewOrigin::Offline { reason: Some(_) }));
        assert_eq!(fallback.tracks, offline.tracks);
        assert_eq!(
            offline.tracks.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn test_offline_with_empty_ledger_is_empty() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let reconciler = Reconciler::new(FakeCatalog::offline(), ledger);

        let view = reconciler.refresh(ViewMode::All).await.unwrap();
        assert!(view.is_offline());
        assert!(view.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let catalog = FakeCatalog::serving(vec![remote(3, Some("C")), remote(1, None)]);
        let reconciler = Reconciler::new(catalog, ledger);

        let first = reconciler.refresh(ViewMode::All).await.unwrap();
        let second = reconciler.refresh(ViewMode::All).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.tracks.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![3, 1]
        );
    }

    #[tokio::test]
    async fn test_downloaded_only_filter() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        ledger
            .upsert_metadata(&[remote(1, Some("A")), remote(2, Some("B"))])
            .await
            .unwrap();
        ledger
            .update_download_status(2, true, Some("/m/2_B.mp3"), None)
            .await
            .unwrap();

        let catalog = FakeCatalog::serving(vec![remote(1, Some("A")), remote(2, Some("B"))]);
        let reconciler = Reconciler::new(catalog, ledger);

        let online = reconciler.refresh(ViewMode::DownloadedOnly).await.unwrap();
        assert_eq!(online.tracks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2]);

        let offline = reconciler.offline_view(ViewMode::DownloadedOnly).await.unwrap();
        assert_eq!(offline.tracks, online.tracks);
    }

    #[tokio::test]
    async fn test_ledger_failure_is_not_swallowed() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        ledger.pool().close().await;
        let reconciler = Reconciler::new(FakeCatalog::offline(), ledger);

        let err = reconciler.refresh(ViewMode::All).await.unwrap_err();
        assert!(err.is_storage_error());
    }
}
