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


//! Composition root for the UI layer
//!
//! [`Library`] wires one [`Ledger`] into the reconciler, the download engine
//! and the deletion manager, and keeps the transient state a screen needs:
//! which downloads are running and how far along they are.
//!
//! # Example
//! ```no_run
//! use futures_util::StreamExt;
//! use musicdm_core::{config::SyncConfig, sync::Library};
//!
//! # async fn example() -> musicdm_core::Result<()> {
//! let library = Library::open(&SyncConfig::default()).await?;
//! let view = library.refresh().await?;
//!
//! if let Some(track) = view.tracks.first() {
//!     let mut events = library.download(track.id).await?;
//!     while let Some(event) = events.next().await {
//!         println!("{:?}", event);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::api::{CatalogSource, HttpCatalogSource};
use crate::config::SyncConfig;
use crate::download::events::error_from_reason;
use crate::download::{
    DownloadCommit, DownloadEngine, DownloadEvent, DownloadEvents, DownloadRequest, HttpFetcher,
    PayloadFetcher, ProgressBoard,
};
use crate::error::{Result, SyncError};
use crate::file::paths::download_file_name;
use crate::file::DeletionManager;
use crate::storage::{DownloadStatus, Ledger, TrackId};
use crate::sync::reconciler::{Reconciler, UnifiedView, ViewMode};
use futures_util::{Stream, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;

type ActiveMap = Arc<Mutex<HashMap<TrackId, CancellationToken>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Catalog, ledger, downloads and deletions behind one handle
pub struct Library<C = HttpCatalogSource, F = HttpFetcher> {
    ledger: Ledger,
    reconciler: Reconciler<C>,
    engine: DownloadEngine<F>,
    deletion: DeletionManager,
    board: Arc<Mutex<ProgressBoard>>,
    active: ActiveMap,
    mode: Mutex<ViewMode>,
}

impl Library {
    /// Open the ledger under `config.data_dir` and build HTTP clients
    pub async fn open(config: &SyncConfig) -> Result<Self> {
        config.validate()?;

        let ledger = Ledger::open(config.ledger_path()).await?;
        let source = HttpCatalogSource::new(
            config.catalog_url.clone(),
            &config.user_agent,
            config.request_timeout(),
        )?;
        let fetcher = HttpFetcher::new(&config.user_agent, config.request_timeout())?;
        let engine = DownloadEngine::new(fetcher, config.music_dir())
            .with_chunk_size(config.chunk_size)
            .with_event_buffer(config.event_buffer)
            .with_max_concurrent(config.max_concurrent_downloads)
            .with_idle_timeout(config.request_timeout());

        Ok(Self::with_parts(ledger, source, engine))
    }
}

impl<C: CatalogSource, F: PayloadFetcher> Library<C, F> {
    /// Assemble from explicit parts; payloads live in the engine's music dir
    pub fn with_parts(ledger: Ledger, source: C, engine: DownloadEngine<F>) -> Self {
        let deletion = DeletionManager::new(engine.music_dir().to_path_buf(), ledger.clone());

        Self {
            reconciler: Reconciler::new(source, ledger.clone()),
            ledger,
            engine,
            deletion,
            board: Arc::new(Mutex::new(ProgressBoard::new())),
            active: Arc::new(Mutex::new(HashMap::new())),
            mode: Mutex::new(ViewMode::default()),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn catalog(&self) -> &C {
        self.reconciler.source()
    }

    pub fn music_dir(&self) -> &Path {
        self.engine.music_dir()
    }

    pub fn mode(&self) -> ViewMode {
        *lock(&self.mode)
    }

    /// Switch between the full catalog and downloaded tracks only
    pub fn set_mode(&self, mode: ViewMode) {
        *lock(&self.mode) = mode;
    }

    /// Catalog merged with the ledger, or the ledger alone when offline
    pub async fn refresh(&self) -> Result<UnifiedView> {
        self.reconciler.refresh(self.mode()).await
    }

    pub async fn offline_view(&self) -> Result<UnifiedView> {
        self.reconciler.offline_view(self.mode()).await
    }

    /// Start downloading `id`
    ///
    /// The track must be known to the ledger (i.e. seen in a refresh). Fails
    /// with `InvalidState` while another download of the same track runs.
    pub async fn download(&self, id: TrackId) -> Result<TrackedDownload> {
        let record = self
            .ledger
            .fetch_by_id(id)
            .await?
            .ok_or_else(|| SyncError::not_found(format!("track {}", id)))?;

        if record.download_url.is_empty() {
            return Err(SyncError::invalid_input(format!(
                "track {} has no download URL",
                id
            )));
        }

        let cancel = self.engine.child_token();
        let slot = ActiveSlot::claim(&self.active, id, cancel.clone())?;
        let file_name = download_file_name(&record.title, &record.download_url);
        log::info!("starting download of track {} as {}", id, file_name);

        let request = DownloadRequest::new(id, record.download_url, file_name);
        let commit = SlotCommit {
            ledger: self.ledger.clone(),
            _slot: slot,
        };
        let events = self.engine.download_with_token(request, commit, cancel);

        Ok(TrackedDownload {
            events,
            board: Arc::clone(&self.board),
        })
    }

    /// Cancel a running download; `false` if none was running
    pub fn cancel(&self, id: TrackId) -> bool {
        match lock(&self.active).get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_downloading(&self, id: TrackId) -> bool {
        lock(&self.active).contains_key(&id)
    }

    pub fn active_downloads(&self) -> usize {
        lock(&self.active).len()
    }

    /// Remove the payload of `id` and mark it not downloaded
    ///
    /// `Ok(false)` when there was nothing to delete or a file could not be
    /// removed. A running download must be cancelled first.
    pub async fn delete(&self, id: TrackId) -> Result<bool> {
        if self.is_downloading(id) {
            return Err(SyncError::InvalidState(format!(
                "track {} is downloading",
                id
            )));
        }
        self.deletion.delete(id).await
    }

    /// Payload path for a playback client
    pub async fn locate(&self, id: TrackId) -> Result<Option<PathBuf>> {
        self.deletion.locate(id).await
    }

    /// Overlay in-flight and failed downloads onto a snapshot
    pub fn decorate(&self, view: &mut UnifiedView) {
        lock(&self.board).decorate(&mut view.tracks);
    }

    /// Transient status of `id`, if a download is running or has failed
    pub fn progress(&self, id: TrackId) -> Option<DownloadStatus> {
        lock(&self.board).status(id)
    }

    pub fn dismiss_failure(&self, id: TrackId) {
        lock(&self.board).dismiss(id);
    }

    /// Cancel every running download
    pub fn shutdown(&self) {
        self.engine.shutdown();
    }
}

/// Marks `id` as downloading until dropped
struct ActiveSlot {
    active: ActiveMap,
    id: TrackId,
}

impl ActiveSlot {
    fn claim(active: &ActiveMap, id: TrackId, cancel: CancellationToken) -> Result<Self> {
        let mut map = lock(active);
        if map.contains_key(&id) {
            return Err(SyncError::InvalidState(format!(
                "download of track {} already running",
                id
            )));
        }
        map.insert(id, cancel);

        Ok(Self {
            active: Arc::clone(active),
            id,
        })
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.id);
    }
}

/// Ledger commit that holds the track's slot for the life of the engine run
struct SlotCommit {
    ledger: Ledger,
    _slot: ActiveSlot,
}

impl DownloadCommit for SlotCommit {
    async fn commit(&self, id: TrackId, local_path: &Path) -> Result<()> {
        self.ledger.commit(id, local_path).await
    }
}

/// [`DownloadEvents`] that also feed the library's progress board
#[derive(Debug)]
pub struct TrackedDownload {
    events: DownloadEvents,
    board: Arc<Mutex<ProgressBoard>>,
}

impl TrackedDownload {
    pub fn id(&self) -> TrackId {
        self.events.id()
    }

    pub fn cancel(&self) {
        self.events.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.events.is_finished()
    }

    pub async fn collect_events(mut self) -> Vec<DownloadEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }

    /// Drain the sequence, returning the stored path or the failure reason
    pub async fn wait(mut self) -> Result<PathBuf> {
        while let Some(event) = self.next().await {
            match event {
                DownloadEvent::Success(path) => return Ok(path),
                DownloadEvent::Error(reason) => return Err(error_from_reason(reason)),
                DownloadEvent::Idle | DownloadEvent::Progress(_) => {}
            }
        }
        Err(SyncError::Cancelled)
    }
}

impl Stream for TrackedDownload {
    type Item = DownloadEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.events.poll_next_unpin(cx);
        if let Poll::Ready(Some(event)) = &polled {
            lock(&this.board).apply(this.events.id(), event);
        }
        polled
    }
}

impl Drop for TrackedDownload {
    fn drop(&mut self) {
        if !self.events.is_finished() {
            lock(&self.board).abandon(self.events.id());
        }
    }
}
