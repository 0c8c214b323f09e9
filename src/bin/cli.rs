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


use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueHint};
use futures_util::StreamExt;
use log::LevelFilter;
use musicdm_core::sync::Library;
use musicdm_core::{DownloadEvent, SyncConfig, Track, TrackId, UnifiedView, ViewMode, ViewOrigin};
use std::path::PathBuf;

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

#[derive(Parser)]
#[command(name = "musicdm-cli")]
#[command(about = "MusicDM CLI - sync the catalog and manage offline tracks", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Catalog URL, overrides the config file
    #[arg(long, value_hint = ValueHint::Url)]
    catalog_url: Option<String>,

    /// Data directory holding the ledger and music files
    #[arg(long, value_hint = ValueHint::DirPath)]
    data_dir: Option<PathBuf>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the catalog and merge it into the ledger
    Refresh {
        /// Only list downloaded tracks
        #[arg(long)]
        downloaded_only: bool,
    },
    /// List the ledger without touching the network
    Offline {
        /// Only list downloaded tracks
        #[arg(long)]
        downloaded_only: bool,
    },
    /// Download a track's payload
    Download { id: TrackId },
    /// Delete a track's payload
    Delete { id: TrackId },
    /// Print where a track can be played from
    Locate { id: TrackId },
}

/// Initializes the logger facade.
///
/// Command line flags take precedence over `RUST_LOG`, which takes
/// precedence over the `info` default.
fn init_logger(cli: &Cli) {
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if cli.quiet || cli.verbose > 0 {
        let level = match cli.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        logger.filter_module("musicdm_core", level);
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

fn load_config(cli: &Cli) -> anyhow::Result<SyncConfig> {
    let mut config = match &cli.config {
        Some(path) => SyncConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SyncConfig::default(),
    };

    if let Some(url) = &cli.catalog_url {
        config.catalog_url = url.clone();
    }
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

fn print_view(view: &UnifiedView) {
    if let ViewOrigin::Offline { reason: Some(reason) } = &view.origin {
        println!("offline: {}", reason);
    }
    for track in &view.tracks {
        print_track(track);
    }
    println!("{} track(s)", view.len());
}

fn print_track(track: &Track) {
    let marker = if track.is_downloaded() { "*" } else { " " };
    println!(
        "{} {:>6}  {} - {}  [{}]",
        marker,
        track.id,
        track.artist,
        track.title,
        format_duration(track.duration)
    );
}

fn format_duration(millis: i64) -> String {
    let secs = millis.max(0) / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let library = Library::open(&config)
        .await
        .with_context(|| format!("opening library in {}", config.data_dir.display()))?;

    match cli.command {
        Commands::Refresh { downloaded_only } | Commands::Offline { downloaded_only } => {
            let mode = if downloaded_only {
                ViewMode::DownloadedOnly
            } else {
                ViewMode::All
            };
            library.set_mode(mode);

            let view = if matches!(cli.command, Commands::Refresh { .. }) {
                library.refresh().await?
            } else {
                library.offline_view().await?
            };
            print_view(&view);
        }
        Commands::Download { id } => {
            let mut events = library.download(id).await?;
            let mut outcome = None;

            while let Some(event) = events.next().await {
                match event {
                    DownloadEvent::Idle => println!("track {}: starting", id),
                    DownloadEvent::Progress(percent) => println!("track {}: {}%", id, percent),
                    DownloadEvent::Success(path) => outcome = Some(Ok(path)),
                    DownloadEvent::Error(reason) => outcome = Some(Err(reason)),
                }
            }

            match outcome {
                Some(Ok(path)) => println!("saved to {}", path.display()),
                Some(Err(reason)) => bail!("download of track {} failed: {}", id, reason),
                None => bail!("download of track {} ended without a result", id),
            }
        }
        Commands::Delete { id } => {
            if library.delete(id).await? {
                println!("deleted track {}", id);
            } else {
                bail!("nothing deleted for track {}", id);
            }
        }
        Commands::Locate { id } => match library.locate(id).await? {
            Some(path) => println!("{}", path.display()),
            None => {
                let record = library.ledger().fetch_by_id(id).await?;
                match record {
                    Some(record) => println!("{}", record.to_track().media_location()),
                    None => bail!("unknown track {}", id),
                }
            }
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(&cli);

    run(cli).await
}
