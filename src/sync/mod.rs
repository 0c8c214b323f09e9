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


//! Keeping the catalog, the ledger and the UI state consistent
//!
//! # Key Operations
//! - [`Reconciler::refresh`]: merge the remote catalog into the ledger, offline fallback
//! - [`Library`]: single handle the UI layer talks to

pub mod library;
pub mod reconciler;

// Re-export commonly used types
pub use library::{Library, TrackedDownload};
pub use reconciler::{Reconciler, UnifiedView, ViewMode, ViewOrigin};
