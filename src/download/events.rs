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


//! Download event sequence and progress bookkeeping
//!
//! A download is observed through [`DownloadEvents`], a single-consumer
//! stream fed by a bounded channel:
//!
//! ```text
//! Idle, Progress(p0), Progress(p1), ..., Success(path) | Error(reason)
//! ```
//!
//! - exactly one `Idle` first
//! - `Progress` values are non-decreasing and within `0..=100`
//! - exactly one terminal event, after which the stream ends
//!
//! Nothing is fetched until the stream is first polled. Dropping the handle
//! before the terminal event cancels the transfer.

use crate::error::{Result, SyncError};
use crate::storage::models::{DownloadStatus, Track, TrackId};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// One step of a download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadEvent {
    Idle,
    /// Percent complete, 0..=100
    Progress(u8),
    Success(PathBuf),
    Error(String),
}

impl DownloadEvent {
    /// `Success` or `Error`
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadEvent::Success(_) | DownloadEvent::Error(_))
    }
}

/// Consumer side of a running download
#[derive(Debug)]
pub struct DownloadEvents {
    id: TrackId,
    rx: mpsc::Receiver<DownloadEvent>,
    start: Option<oneshot::Sender<()>>,
    cancel: CancellationToken,
    finished: bool,
}

impl DownloadEvents {
    pub(crate) fn new(
        id: TrackId,
        rx: mpsc::Receiver<DownloadEvent>,
        start: oneshot::Sender<()>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            rx,
            start: Some(start),
            cancel,
            finished: false,
        }
    }

    /// Track this download belongs to
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Request cancellation; the stream still ends with an `Error` event
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this download when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the terminal event has been delivered
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drain the sequence and return every event
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

impl Stream for DownloadEvents {
    type Item = DownloadEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(start) = this.start.take() {
            let _ = start.send(());
        }

        if this.finished {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for DownloadEvents {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel.cancel();
        }
    }
}

pub(crate) fn error_from_reason(reason: String) -> SyncError {
    if reason == SyncError::Cancelled.to_string() {
        SyncError::Cancelled
    } else {
        SyncError::DownloadFailed(reason)
    }
}

/// Per-track state of downloads the UI is currently tracking
///
/// In-flight entries are removed on their terminal event, so the board only
/// grows with the number of concurrent downloads. The most recent failure per
/// track is kept until that track is started again or dismissed.
#[derive(Debug, Default, Clone)]
pub struct ProgressBoard {
    in_flight: HashMap<TrackId, u8>,
    failures: HashMap<TrackId, String>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event for `id` into the board
    pub fn apply(&mut self, id: TrackId, event: &DownloadEvent) {
        match event {
            DownloadEvent::Idle => {
                self.failures.remove(&id);
                self.in_flight.insert(id, 0);
            }
            DownloadEvent::Progress(percent) => {
                let entry = self.in_flight.entry(id).or_insert(0);
                *entry = (*entry).max(*percent);
            }
            DownloadEvent::Success(_) => {
                self.in_flight.remove(&id);
            }
            DownloadEvent::Error(reason) => {
                self.in_flight.remove(&id);
                self.failures.insert(id, reason.clone());
            }
        }
    }

    /// Forget an in-flight entry whose stream was abandoned
    pub fn abandon(&mut self, id: TrackId) {
        self.in_flight.remove(&id);
    }

    /// Clear a recorded failure
    pub fn dismiss(&mut self, id: TrackId) {
        self.failures.remove(&id);
    }

    /// Status to show for `id`, if the board knows anything about it
    pub fn status(&self, id: TrackId) -> Option<DownloadStatus> {
        if let Some(progress) = self.in_flight.get(&id) {
            return Some(DownloadStatus::Downloading { progress: *progress });
        }
        self.failures
            .get(&id)
            .map(|reason| DownloadStatus::Failed { reason: reason.clone() })
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty() && self.failures.is_empty()
    }

    /// Overlay transient states onto a snapshot. Downloaded tracks keep the
    /// ledger's status.
    pub fn decorate(&self, tracks: &mut [Track]) {
        for track in tracks.iter_mut() {
            if track.is_downloaded() {
                continue;
            }
            if let Some(status) = self.status(track.id) {
                track.download_status = status;
            }
        }
    }
}
