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


//! Payload downloads
//!
//! # Key Operations
//! - [`DownloadEngine::download`]: lazy, cancellable `Idle → Progress* → Success | Error`
//! - [`DownloadCommit`]: durable record written before `Success` is emitted
//! - [`ProgressBoard`]: transient per-track state for the UI

pub mod engine;
pub mod events;
pub mod fetch;

// Re-export commonly used types
pub use engine::{DownloadCommit, DownloadEngine, DownloadRequest, NoCommit, DEFAULT_CHUNK_SIZE};
pub use events::{DownloadEvent, DownloadEvents, ProgressBoard};
pub use fetch::{ByteStream, HttpFetcher, PayloadFetcher, PayloadResponse};
