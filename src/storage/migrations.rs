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


//! Ledger migrations
//!
//! Migrations run as plain SQL at open time (no build-time database needed).
//! Applied migrations are tracked in `_migrations`.

use crate::error::Result;
use sqlx::{Executor, SqlitePool};

/// Run all ledger migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    create_migrations_table(pool).await?;

    run_migration(pool, 1, "songs_table", create_songs_table(pool)).await?;

    Ok(())
}

async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;

    Ok(())
}

/// Run a single migration if it hasn't been applied yet
async fn run_migration(
    pool: &SqlitePool,
    id: i32,
    name: &str,
    migration_fn: impl std::future::Future<Output = Result<()>>,
) -> Result<()> {
    let applied: Option<i32> = sqlx::query_scalar("SELECT id FROM _migrations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    if applied.is_some() {
        return Ok(());
    }

    migration_fn.await?;

    sqlx::query("INSERT INTO _migrations (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;

    log::debug!("applied ledger migration {} ({})", id, name);

    Ok(())
}

/// `songs` table: one row per catalog track, metadata plus download status
async fn create_songs_table(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
CREATE TABLE IF NOT EXISTS songs (
    id INTEGER PRIMARY KEY NOT NULL,

    -- Catalog metadata (remote wins)
    title TEXT NOT NULL,
    artist TEXT NOT NULL,
    streamUrl TEXT NOT NULL,
    downloadUrl TEXT NOT NULL,
    albumArt TEXT,
    duration INTEGER NOT NULL DEFAULT 0,

    -- Download status (local wins)
    isDownloaded INTEGER NOT NULL DEFAULT 0,
    localPath TEXT,
    downloadedAt INTEGER  -- epoch milliseconds
);

CREATE INDEX IF NOT EXISTS idx_songs_downloaded ON songs(isDownloaded);
        "#,
    )
    .await?;

    Ok(())
}
