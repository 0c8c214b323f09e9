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


//! Payload naming and lookup
//!
//! Downloaded payloads live directly in the music directory and are named
//! `<id>_<file name>`, so every file belonging to a track can be found from
//! the id alone. In-flight downloads use a hidden `.<id>_<file name>.part`
//! name which never matches the `<id>_` prefix.

use crate::error::{Result, SyncError};
use crate::storage::models::TrackId;
use std::path::{Path, PathBuf};
use tokio::fs;
use url::Url;

/// Name of the payload subdirectory inside the data directory
pub const MUSIC_DIR_NAME: &str = "music";

/// Extension used when neither the title nor the URL carries one
pub const DEFAULT_EXTENSION: &str = "mp3";

const PART_SUFFIX: &str = ".part";

/// Suffix of a replaced payload kept until the new one is committed
const BACKUP_SUFFIX: &str = ".old";

/// Maximum file name length in bytes (common filesystem limit)
const MAX_FILENAME_BYTES: usize = 255;

/// Prefix shared by every payload file of `id`
pub fn file_prefix(id: TrackId) -> String {
    format!("{}_", id)
}

/// Final on-disk name for a payload
pub fn payload_file_name(id: TrackId, file_name: &str) -> String {
    let prefix = file_prefix(id);
    let budget = MAX_FILENAME_BYTES - prefix.len() - PART_SUFFIX.len() - 1;
    format!("{}{}", prefix, truncate_component(&sanitize_filename(file_name), budget))
}

/// Temporary name used while a payload is being written
pub fn partial_file_name(id: TrackId, file_name: &str) -> String {
    format!(".{}{}", payload_file_name(id, file_name), PART_SUFFIX)
}

/// Hidden name a previous payload is moved to while its replacement commits
pub fn backup_file_name(id: TrackId, file_name: &str) -> String {
    format!(".{}{}", payload_file_name(id, file_name), BACKUP_SUFFIX)
}

/// Whether `name` is a finished payload of `id`
pub fn is_payload_of(name: &str, id: TrackId) -> bool {
    name.starts_with(&file_prefix(id))
}

/// File name for a track download: `<title>.<ext>`
///
/// The extension comes from the last segment of `download_url` when it has
/// one, otherwise `mp3`.
pub fn download_file_name(title: &str, download_url: &str) -> String {
    let extension = url_file_name(download_url)
        .and_then(|name| {
            Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
        })
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

    format!("{}.{}", title, extension)
}

/// Percent-decoded last path segment of `url`
pub fn url_file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    urlencoding::decode(segment).ok().map(|s| s.into_owned())
}

/// Every finished payload of `id` in `music_dir`
///
/// A missing directory means nothing was ever downloaded and yields an empty
/// list; any other listing failure is a storage error.
pub async fn find_payloads(music_dir: &Path, id: TrackId) -> Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(music_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(SyncError::storage(format!(
                "Failed to list {}: {}",
                music_dir.display(),
                e
            )))
        }
    };

    let mut matches = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(name) = name.to_str() {
            if is_payload_of(name, id) {
                matches.push(entry.path());
            }
        }
    }
    matches.sort();

    Ok(matches)
}

/// Sanitize a file name (removes/replaces characters invalid in file names)
pub fn sanitize_filename(name: &str) -> String {
    let mut result: String = name.chars().map(replace_char).collect();

    // Trim leading/trailing whitespace and dots
    result = result.trim().trim_matches('.').to_string();

    if cfg!(target_os = "windows") {
        result = handle_windows_reserved_names(&result);
    }

    if result.is_empty() {
        result = "file".to_string();
    }

    result
}

fn replace_char(c: char) -> char {
    match c {
        '<' => '＜', // U+FF1C fullwidth less-than sign
        '>' => '＞', // U+FF1E fullwidth greater-than sign
        ':' => '_',
        '"' => '＂', // U+FF02 fullwidth quotation mark
        '|' => '⏐', // U+23D0 vertical line extension
        '?' => '？', // U+FF1F fullwidth question mark
        '*' => '✱', // U+2731 heavy asterisk
        '/' => '∕', // U+2215 division slash
        '\\' => '_',
        c if c.is_control() => '_',
        c => c,
    }
}

fn handle_windows_reserved_names(name: &str) -> String {
    let upper = name.to_uppercase();
    let reserved = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];

    for reserved_name in &reserved {
        if upper == *reserved_name || upper.starts_with(&format!("{}.", reserved_name)) {
            return format!("_{}", name);
        }
    }

    name.to_string()
}

/// Truncate to fit within `max_bytes`, keeping the extension when possible
pub fn truncate_component(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let (stem, extension) = match text.rfind('.') {
        Some(dot) if text.len() - dot <= 6 => (&text[..dot], &text[dot..]),
        _ => (text, ""),
    };

    let mut index = max_bytes.saturating_sub(extension.len());
    while index > 0 && !stem.is_char_boundary(index) {
        index -= 1;
    }

    format!("{}{}", &stem[..index], extension)
}
