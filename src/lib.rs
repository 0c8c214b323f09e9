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


//! Download and reconciliation core for an offline music catalog
//!
//! - [`api`]: remote catalog client
//! - [`storage`]: the SQLite ledger of per-track download state
//! - [`download`]: streaming payload downloads with progress events
//! - [`file`]: payload naming, lookup and deletion
//! - [`sync`]: catalog/ledger reconciliation and the [`sync::Library`] root
//! - [`config`]: TOML configuration

pub mod api;
pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod storage;
pub mod sync;

pub use config::SyncConfig;
pub use download::{DownloadEngine, DownloadEvent, DownloadEvents, DownloadRequest};
pub use error::{Result, SyncError};
pub use file::DeletionManager;
pub use storage::{DownloadStatus, Ledger, Track, TrackId};
pub use sync::{Library, Reconciler, UnifiedView, ViewMode, ViewOrigin};
