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


//! Streaming payload fetch

use crate::error::{Result, SyncError};
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderValue, USER_AGENT};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;

/// Body of a payload response, delivered chunk by chunk
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Response head plus streaming body
pub struct PayloadResponse {
    pub status: u16,
    /// Declared `Content-Length`, if any
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl PayloadResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for PayloadResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Opens a streaming read of a payload URL
///
/// Implementations return `Ok` for any HTTP response, including error
/// statuses; `Err` means no response was obtained at all.
pub trait PayloadFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<PayloadResponse>> + Send;
}

/// reqwest-backed [`PayloadFetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// `connect_timeout` bounds connection setup only; a body may take as
    /// long as it keeps delivering (see `DownloadEngine::with_idle_timeout`)
    pub fn new(user_agent: &str, connect_timeout: Duration) -> Result<Self> {
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|e| SyncError::invalid_input(format!("Invalid user agent: {}", e)))?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(USER_AGENT, user_agent);

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl PayloadFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<PayloadResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::network_error(format!("connection error: {}", e), true))?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| SyncError::network_error(format!("stream error: {}", e), true))
            })
            .boxed();

        Ok(PayloadResponse {
            status,
            content_length,
            body,
        })
    }
}
