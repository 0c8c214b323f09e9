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


//! Remote catalog client
//!
//! The catalog is a single `GET` returning a JSON array of track descriptors:
//!
//! ```json
//! [{"id": 1, "title": "A", "artist": null, "streamUrl": "...",
//!   "downloadUrl": "...", "albumArt": null, "duration": 215000}]
//! ```
//!
//! Anything that can produce that list implements [`CatalogSource`]; the
//! reconciler only depends on the trait.

use crate::error::{Result, SyncError};
use crate::storage::models::{TrackId, UNKNOWN};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Default User-Agent sent with catalog and payload requests
pub const DEFAULT_USER_AGENT: &str = concat!("musicdm/", env!("CARGO_PKG_VERSION"));

/// Track descriptor as delivered by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTrack {
    pub id: TrackId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub stream_url: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub album_art: Option<String>,
    /// Milliseconds
    #[serde(default)]
    pub duration: i64,
}

impl RemoteTrack {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn display_artist(&self) -> &str {
        self.artist.as_deref().unwrap_or(UNKNOWN)
    }
}

/// Source of the remote catalog
pub trait CatalogSource: Send + Sync {
    /// Fetch the full catalog. Network and non-success responses are errors.
    fn fetch_catalog(&self) -> impl Future<Output = Result<Vec<RemoteTrack>>> + Send;
}

/// HTTP implementation of [`CatalogSource`]
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    client: Client,
    catalog_url: String,
}

impl HttpCatalogSource {
    /// Create a catalog client for `catalog_url`
    pub fn new(catalog_url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| SyncError::invalid_input(format!("Invalid user agent: {}", e)))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self::with_client(client, catalog_url))
    }

    /// Reuse an existing client (shares its connection pool)
    pub fn with_client(client: Client, catalog_url: impl Into<String>) -> Self {
        Self {
            client,
            catalog_url: catalog_url.into(),
        }
    }

    pub fn catalog_url(&self) -> &str {
        &self.catalog_url
    }
}

impl CatalogSource for HttpCatalogSource {
    async fn fetch_catalog(&self) -> Result<Vec<RemoteTrack>> {
        log::debug!("fetching catalog from {}", self.catalog_url);

        let response = self
            .client
            .get(&self.catalog_url)
            .send()
            .await
            .map_err(|e| SyncError::network_error(format!("Catalog request failed: {}", e), true))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::server_error(status.as_u16(), &self.catalog_url));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::network_error(format!("Catalog body failed: {}", e), true))?;

        let tracks = parse_catalog(&body)?;
        log::info!("catalog returned {} tracks", tracks.len());

        Ok(tracks)
    }
}

/// Decode a catalog body
pub fn parse_catalog(body: &[u8]) -> Result<Vec<RemoteTrack>> {
    serde_json::from_slice(body).map_err(|e| SyncError::InvalidCatalog(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog_with_nullable_fields() {
        let body = br#"[
            {"id": 1, "title": "A", "artist": null, "streamUrl": "https://s/1",
             "downloadUrl": "https://d/1", "albumArt": null, "duration": 215000},
            {"id": 2, "streamUrl": "https://s/2", "downloadUrl": "https://d/2", "duration": 1}
        ]"#;

        let tracks = parse_catalog(body).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].display_title(), "A");
        assert_eq!(tracks[0].display_artist(), "Unknown");
        assert_eq!(tracks[0].duration, 215_000);
        assert_eq!(tracks[1].display_title(), "Unknown");
        assert_eq!(tracks[1].album_art, None);
    }

    #[test]
    fn test_malformed_catalog_is_network_side_error() {
        let err = parse_catalog(b"<html>maintenance</html>").unwrap_err();
        assert!(matches!(err, SyncError::InvalidCatalog(_)));
        assert!(err.is_network_error());
    }
}
