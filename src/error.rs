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


//! Error types for MusicDM
//!
//! Errors are grouped by where they originate:
//!
//! - **Network**: catalog fetch or payload stream failures (`Network`, `Server`)
//! - **Storage**: ledger and filesystem failures (`Storage`, `Database`, `Io`)
//! - **Lookup**: ids or files that do not exist (`NotFound`)
//! - **State**: operations that conflict with what is already running
//!
//! Catalog failures are normally recovered by the reconciler (offline fallback),
//! download failures become terminal `Error` events, and storage failures are
//! always surfaced to the caller.

use thiserror::Error;

/// Result type alias using our SyncError type
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for MusicDM
#[derive(Error, Debug)]
pub enum SyncError {
    // ===== Network Errors =====

    /// Connectivity failure while talking to the catalog or payload host
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// Server answered with a non-success status code
    #[error("server error: {status_code}")]
    Server {
        status_code: u16,
        /// URL that was requested
        url: String,
    },

    /// A download ended with an `Error` event
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Catalog body could not be interpreted
    #[error("Invalid catalog response: {0}")]
    InvalidCatalog(String),

    // ===== Storage Errors =====

    /// Ledger or filesystem failure with context
    #[error("Storage error: {0}")]
    Storage(String),

    /// Ledger schema migration failed
    #[error("Ledger migration failed: {0}")]
    MigrationFailed(String),

    /// Requested track or file does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    // ===== Input/State Errors =====

    /// Caller supplied something unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation conflicts with current state (e.g. download already running)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration file or value is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation was cancelled by the consumer
    #[error("Operation cancelled")]
    Cancelled,

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML config parse error
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl SyncError {
    /// Create a NotFound error with a resource name
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        SyncError::NotFound(resource.into())
    }

    /// Create a Storage error with a message
    pub fn storage<S: Into<String>>(message: S) -> Self {
        SyncError::Storage(message.into())
    }

    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        SyncError::InvalidInput(message.into())
    }

    /// Create a Network error
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        SyncError::Network {
            message: message.into(),
            is_transient,
        }
    }

    /// Create a Server error for a status code returned by `url`
    pub fn server_error<S: Into<String>>(status_code: u16, url: S) -> Self {
        SyncError::Server {
            status_code,
            url: url.into(),
        }
    }

    /// Check if error is retryable (network errors, 5xx responses)
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network { is_transient, .. } => *is_transient,
            SyncError::Server { status_code, .. } => (500..=599).contains(status_code),
            SyncError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Network-side failure: the remote was unreachable or refused the request.
    ///
    /// These are the errors the reconciler recovers from by serving the ledger.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            SyncError::Network { .. }
                | SyncError::Server { .. }
                | SyncError::InvalidCatalog(_)
                | SyncError::Http(_)
        )
    }

    /// Ledger or filesystem failure. Never recovered silently.
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            SyncError::Storage(_)
                | SyncError::MigrationFailed(_)
                | SyncError::Database(_)
                | SyncError::Io(_)
        )
    }

    /// Message suitable for showing next to a track or in a notice
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Network { .. } | SyncError::Http(_) => {
                "Can't reach the music server. Showing your downloaded songs.".to_string()
            }
            SyncError::Server { status_code, .. } => {
                format!("The music server returned an error ({}).", status_code)
            }
            SyncError::Database(_) | SyncError::MigrationFailed(_) => {
                "Your local music library could not be read.".to_string()
            }
            SyncError::NotFound(what) => format!("{} was not found.", what),
            SyncError::Cancelled => "Download cancelled.".to_string(),
            _ => self.to_string(),
        }
    }
}
