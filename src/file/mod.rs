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


//! Payload files on disk
//!
//! # Key Operations
//! - Deterministic `<id>_<name>` naming and prefix lookup
//! - Deletion of a track's payloads with ledger update

pub mod deletion;
pub mod paths;

// Re-export commonly used types
pub use deletion::DeletionManager;
pub use paths::{find_payloads, payload_file_name, MUSIC_DIR_NAME};
