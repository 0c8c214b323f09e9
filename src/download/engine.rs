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


//! Streaming payload download
//!
//! # Algorithm
//! 1. Wait until the consumer first polls the event stream, emit `Idle`
//! 2. Open a streaming GET; a non-success status ends with `Error` and no file
//! 3. Create the music directory, write the body to `.<id>_<name>.part`
//!    through a buffered writer, emitting `Progress` whenever the integer
//!    percent increases (only when `Content-Length` is known)
//! 4. Flush and fsync; move an existing `<id>_<name>` aside, rename into place
//! 5. Run the commit hook (normally the ledger update); only then `Success`
//! 6. Remove the set-aside file and any other `<id>_*` payload
//!
//! Any failure, including cancellation, removes whatever file this run
//! created and restores a set-aside payload before the terminal `Error` is
//! sent. The commit hook is dropped before the terminal event.

use crate::download::events::{DownloadEvent, DownloadEvents};
use crate::download::fetch::{HttpFetcher, PayloadFetcher};
use crate::error::{Result, SyncError};
use crate::file::paths::{backup_file_name, find_payloads, partial_file_name, payload_file_name};
use crate::storage::{Ledger, TrackId};
use chrono::Utc;
use futures_util::StreamExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;

/// Writer buffer size
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Events buffered before the producer waits for the consumer
pub const DEFAULT_EVENT_BUFFER: usize = 16;

/// What to download and what to call it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub id: TrackId,
    pub url: String,
    /// Source-provided file name; stored as `<id>_<file_name>`
    pub file_name: String,
}

impl DownloadRequest {
    pub fn new(id: TrackId, url: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            file_name: file_name.into(),
        }
    }
}

/// Durable record of a finished download
///
/// Runs after the payload is in its final place and before `Success` is
/// emitted. A failing commit turns the download into an `Error` and the
/// payload is removed.
pub trait DownloadCommit: Send + Sync + 'static {
    fn commit(&self, id: TrackId, local_path: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// Commit hook that records nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCommit;

impl DownloadCommit for NoCommit {
    async fn commit(&self, _id: TrackId, _local_path: &Path) -> Result<()> {
        Ok(())
    }
}

impl DownloadCommit for Ledger {
    async fn commit(&self, id: TrackId, local_path: &Path) -> Result<()> {
        let path = local_path.to_str().ok_or_else(|| {
            SyncError::invalid_input(format!("Non UTF-8 path: {}", local_path.display()))
        })?;
        self.update_download_status(id, true, Some(path), Some(Utc::now()))
            .await
    }
}

/// Stateless per-call payload downloader
///
/// Runs each download on its own tokio task. Different ids may download
/// concurrently; callers serialise downloads of the same id.
pub struct DownloadEngine<F = HttpFetcher> {
    fetcher: Arc<F>,
    music_dir: PathBuf,
    chunk_size: usize,
    event_buffer: usize,
    limiter: Option<Arc<Semaphore>>,
    idle_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl<F> Clone for DownloadEngine<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            music_dir: self.music_dir.clone(),
            chunk_size: self.chunk_size,
            event_buffer: self.event_buffer,
            limiter: self.limiter.clone(),
            idle_timeout: self.idle_timeout,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<F: PayloadFetcher> DownloadEngine<F> {
    pub fn new(fetcher: F, music_dir: PathBuf) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            music_dir,
            chunk_size: DEFAULT_CHUNK_SIZE,
            event_buffer: DEFAULT_EVENT_BUFFER,
            limiter: None,
            idle_timeout: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Writer buffer size, clamped to 4–64 KiB
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }

    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer.max(1);
        self
    }

    /// Cap the number of transfers running at once
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.limiter = Some(Arc::new(Semaphore::new(max_concurrent.max(1))));
        self
    }

    /// Fail a transfer when the response head or the next body chunk takes
    /// longer than `idle_timeout`
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    pub fn music_dir(&self) -> &Path {
        &self.music_dir
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Cancel every download started from this engine (and its clones)
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token cancelled by [`shutdown`](Self::shutdown)
    pub fn child_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Start a download; nothing happens until the returned stream is polled
    ///
    /// Must be called from within a tokio runtime.
    pub fn download<C: DownloadCommit>(&self, request: DownloadRequest, commit: C) -> DownloadEvents {
        self.download_with_token(request, commit, self.child_token())
    }

    /// Like [`download`](Self::download), cancelled by `cancel` as well
    pub fn download_with_token<C: DownloadCommit>(
        &self,
        request: DownloadRequest,
        commit: C,
        cancel: CancellationToken,
    ) -> DownloadEvents {
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let (start_tx, start_rx) = oneshot::channel();
        let id = request.id;

        let job = Job {
            fetcher: Arc::clone(&self.fetcher),
            request,
            music_dir: self.music_dir.clone(),
            chunk_size: self.chunk_size,
            limiter: self.limiter.clone(),
            idle_timeout: self.idle_timeout,
            cancel: cancel.clone(),
            tx,
        };
        tokio::spawn(job.run(start_rx, commit));

        DownloadEvents::new(id, rx, start_tx, cancel)
    }
}

/// One download run, owned by its task
struct Job<F> {
    fetcher: Arc<F>,
    request: DownloadRequest,
    music_dir: PathBuf,
    chunk_size: usize,
    limiter: Option<Arc<Semaphore>>,
    idle_timeout: Option<Duration>,
    cancel: CancellationToken,
    tx: mpsc::Sender<DownloadEvent>,
}

impl<F: PayloadFetcher> Job<F> {
    async fn run<C: DownloadCommit>(self, start: oneshot::Receiver<()>, commit: C) {
        let started = tokio::select! {
            _ = self.cancel.cancelled() => false,
            polled = start => polled.is_ok(),
        };
        if !started {
            log::debug!("download of track {} dropped before start", self.request.id);
            return;
        }

        if self.tx.send(DownloadEvent::Idle).await.is_err() {
            return;
        }

        let terminal = match self.execute(&commit).await {
            Ok(path) => {
                log::info!("track {} downloaded to {}", self.request.id, path.display());
                DownloadEvent::Success(path)
            }
            Err(SyncError::Cancelled) => {
                log::info!("download of track {} cancelled", self.request.id);
                DownloadEvent::Error(SyncError::Cancelled.to_string())
            }
            Err(e) => {
                log::error!("download of track {} failed: {}", self.request.id, e);
                DownloadEvent::Error(e.to_string())
            }
        };

        // Whatever the hook holds is released before the consumer sees the outcome
        drop(commit);

        // The consumer may already be gone
        let _ = self.tx.send(terminal).await;
    }

    async fn execute<C: DownloadCommit>(&self, commit: &C) -> Result<PathBuf> {
        let id = self.request.id;
        let partial = self.music_dir.join(partial_file_name(id, &self.request.file_name));
        let target = self.music_dir.join(payload_file_name(id, &self.request.file_name));

        let transferred = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
            result = self.transfer(&partial) => result,
        };
        let transferred = match transferred {
            Ok(()) if self.cancel.is_cancelled() => Err(SyncError::Cancelled),
            other => other,
        };
        if let Err(e) = transferred {
            remove_quietly(&partial).await;
            return Err(e);
        }

        // A payload already at `target` stays recoverable until the commit
        let backup = self.music_dir.join(backup_file_name(id, &self.request.file_name));
        let replaced = match fs::rename(&target, &backup).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                remove_quietly(&partial).await;
                return Err(SyncError::storage(format!(
                    "Failed to set aside {}: {}",
                    target.display(),
                    e
                )));
            }
        };

        if let Err(e) = fs::rename(&partial, &target).await {
            remove_quietly(&partial).await;
            if replaced {
                restore(&backup, &target).await;
            }
            return Err(SyncError::storage(format!(
                "Failed to move {} into place: {}",
                target.display(),
                e
            )));
        }

        // Single commit point: the payload only counts once this succeeds
        if let Err(e) = commit.commit(id, &target).await {
            remove_quietly(&target).await;
            if replaced {
                restore(&backup, &target).await;
            }
            return Err(e);
        }

        if replaced {
            remove_quietly(&backup).await;
        }
        self.remove_stale(&target).await;

        Ok(target)
    }

    /// Remove payloads of this track other than `current`, e.g. stored under
    /// an earlier title
    async fn remove_stale(&self, current: &Path) {
        match find_payloads(&self.music_dir, self.request.id).await {
            Ok(paths) => {
                for path in paths.iter().filter(|p| p.as_path() != current) {
                    log::info!("removing stale payload {}", path.display());
                    remove_quietly(path).await;
                }
            }
            Err(e) => log::warn!("could not look for stale payloads: {}", e),
        }
    }

    /// Await `future`, failing when the idle timeout elapses first
    async fn within_idle<T>(&self, future: impl Future<Output = T>) -> Result<T> {
        match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, future).await.map_err(|_| {
                SyncError::network_error(
                    format!("no data received for {}s", limit.as_secs_f32()),
                    true,
                )
            }),
            None => Ok(future.await),
        }
    }

    /// Stream the body into `partial`, reporting progress
    async fn transfer(&self, partial: &Path) -> Result<()> {
        let _permit = match &self.limiter {
            Some(limiter) => Some(
                Arc::clone(limiter)
                    .acquire_owned()
                    .await
                    .map_err(|_| SyncError::Cancelled)?,
            ),
            None => None,
        };

        let response = self.within_idle(self.fetcher.fetch(&self.request.url)).await??;
        if !response.is_success() {
            return Err(SyncError::server_error(response.status, &self.request.url));
        }

        fs::create_dir_all(&self.music_dir).await.map_err(|e| {
            SyncError::storage(format!(
                "Failed to create music directory {}: {}",
                self.music_dir.display(),
                e
            ))
        })?;

        let total = response.content_length.filter(|&len| len > 0);
        log::debug!(
            "track {}: streaming {} bytes into {}",
            self.request.id,
            total.map_or_else(|| "unknown".to_string(), |t| t.to_string()),
            partial.display()
        );

        let file = File::create(partial).await?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut body = response.body;
        let mut written = 0u64;
        let mut last_percent: Option<u8> = None;

        while let Some(chunk) = self.within_idle(body.next()).await? {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if let Some(total) = total {
                let percent = (written.saturating_mul(100) / total).min(100) as u8;
                if last_percent.map_or(true, |last| percent > last) {
                    last_percent = Some(percent);
                    self.tx
                        .send(DownloadEvent::Progress(percent))
                        .await
                        .map_err(|_| SyncError::Cancelled)?;
                }
            }
        }

        writer.flush().await?;
        writer.get_ref().sync_all().await?;

        if let Some(total) = total {
            if written < total {
                return Err(SyncError::DownloadFailed(format!(
                    "Download incomplete: {}/{} bytes",
                    written, total
                )));
            }
        }

        Ok(())
    }
}

async fn restore(backup: &Path, target: &Path) {
    if let Err(e) = fs::rename(backup, target).await {
        log::error!(
            "could not restore {} from {}: {}",
            target.display(),
            backup.display(),
            e
        );
    }
}

async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => log::debug!("removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("could not remove {}: {}", path.display(), e),
    }
}
