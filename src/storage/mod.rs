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


//! Local download ledger
//!
//! SQLite storage (via sqlx) for per-track metadata and download status.
//!
//! # Database Schema
//! - `songs`: one row per catalog track; catalog metadata columns plus
//!   `isDownloaded`, `localPath`, `downloadedAt`
//! - `_migrations`: applied schema migrations
//!
//! # Usage Example
//! ```no_run
//! use musicdm_core::storage::Ledger;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = Ledger::open("./musicdm.db").await?;
//! for record in ledger.fetch_downloaded().await? {
//!     println!("{} -> {:?}", record.title, record.local_path);
//! }
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

// Re-export commonly used types
pub use database::{Ledger, LEDGER_FILE_NAME};
pub use models::{DownloadStatus, LedgerRecord, Track, TrackId, UNKNOWN};
