//! End-to-end tests of `Library` with in-process catalog and payload fakes

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use musicdm_core::api::{CatalogSource, RemoteTrack};
use musicdm_core::download::{ByteStream, PayloadFetcher, PayloadResponse};
use musicdm_core::{
    DownloadEngine, DownloadEvent, DownloadStatus, Ledger, Library, SyncError, TrackId, ViewMode,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

struct FakeCatalog(Mutex<Option<Vec<RemoteTrack>>>);

impl CatalogSource for FakeCatalog {
    async fn fetch_catalog(&self) -> musicdm_core::Result<Vec<RemoteTrack>> {
        self.0
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SyncError::network_error("connection refused", true))
    }
}

#[derive(Clone)]
struct Payload {
    status: u16,
    body: Vec<u8>,
    declared_length: Option<u64>,
    stall: bool,
}

impl Payload {
    fn ok(body: &[u8]) -> Self {
        Self {
            status: 200,
            body: body.to_vec(),
            declared_length: Some(body.len() as u64),
            stall: false,
        }
    }
}

#[derive(Default)]
struct FakeFetcher {
    payloads: HashMap<String, Payload>,
}

impl PayloadFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> musicdm_core::Result<PayloadResponse> {
        let payload = self
            .payloads
            .get(url)
            .cloned()
            .ok_or_else(|| SyncError::network_error("connection error: no route", true))?;

        let head = stream::iter(
            payload
                .body
                .chunks(10)
                .map(|c| Ok::<_, SyncError>(Bytes::copy_from_slice(c)))
                .collect::<Vec<_>>(),
        );
        let body: ByteStream = if payload.stall {
            head.chain(stream::pending()).boxed()
        } else {
            head.boxed()
        };

        Ok(PayloadResponse {
            status: payload.status,
            content_length: payload.declared_length,
            body,
        })
    }
}

fn remote(id: TrackId, title: &str) -> RemoteTrack {
    RemoteTrack {
        id,
        title: Some(title.to_string()),
        artist: Some("Artist".to_string()),
        stream_url: format!("https://cdn.example.com/s/{}", id),
        download_url: format!("https://cdn.example.com/d/{}.mp3", id),
        album_art: None,
        duration: 180_000,
    }
}

async fn library(
    dir: &TempDir,
    catalog: Option<Vec<RemoteTrack>>,
    payloads: Vec<(TrackId, Payload)>,
) -> Library<FakeCatalog, FakeFetcher> {
    let ledger = Ledger::open(dir.path().join("musicdm.db")).await.unwrap();
    let fetcher = FakeFetcher {
        payloads: payloads
            .into_iter()
            .map(|(id, p)| (format!("https://cdn.example.com/d/{}.mp3", id), p))
            .collect(),
    };
    let engine = DownloadEngine::new(fetcher, dir.path().join("music"));
    Library::with_parts(ledger, FakeCatalog(Mutex::new(catalog)), engine)
}

fn music_files(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => {
            let mut names: Vec<String> = entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }
        Err(_) => Vec::new(),
    }
}

async fn wait_until_idle(library: &Library<FakeCatalog, FakeFetcher>, id: TrackId) {
    for _ in 0..200 {
        if !library.is_downloading(id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("track {} still marked as downloading", id);
}

#[tokio::test]
async fn test_download_then_delete_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let body = vec![7u8; 95];
    let library = library(
        &dir,
        Some(vec![remote(1, "A"), remote(2, "B")]),
        vec![(1, Payload::ok(&body))],
    )
    .await;

    let view = library.refresh().await.unwrap();
    assert!(!view.is_offline());
    assert!(!view.get(1).unwrap().is_downloaded());

    let events = library.download(1).await.unwrap().collect_events().await;
    let expected = library.music_dir().join("1_A.mp3");
    assert_eq!(events.first(), Some(&DownloadEvent::Idle));
    assert_eq!(events.last(), Some(&DownloadEvent::Success(expected.clone())));
    assert_eq!(std::fs::read(&expected).unwrap(), body);

    // The ledger is committed before Success is observed
    let view = library.refresh().await.unwrap();
    let track = view.get(1).unwrap();
    assert_eq!(track.download_status.local_path(), Some(&expected));
    assert_eq!(track.media_location(), expected.display().to_string());
    assert_eq!(library.locate(1).await.unwrap(), Some(expected.clone()));

    assert!(!library.is_downloading(1));
    assert!(library.delete(1).await.unwrap());
    assert!(music_files(library.music_dir()).is_empty());

    let record = library.ledger().fetch_by_id(1).await.unwrap().unwrap();
    assert!(!record.is_downloaded);
    assert_eq!(record.local_path, None);
    assert_eq!(record.downloaded_at, None);

    let view = library.refresh().await.unwrap();
    assert_eq!(view.get(1).unwrap().download_status, DownloadStatus::NotDownloaded);
}

#[tokio::test]
async fn test_delete_without_payload_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let library = library(&dir, Some(vec![remote(1, "A")]), Vec::new()).await;
    library.refresh().await.unwrap();
    let before = library.ledger().fetch_by_id(1).await.unwrap();

    assert!(!library.delete(1).await.unwrap());

    assert_eq!(library.ledger().fetch_by_id(1).await.unwrap(), before);
}

#[tokio::test]
async fn test_server_error_marks_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut payload = Payload::ok(b"ignored");
    payload.status = 500;
    let library = library(&dir, Some(vec![remote(1, "A")]), vec![(1, payload)]).await;
    library.refresh().await.unwrap();

    let events = library.download(1).await.unwrap().collect_events().await;

    assert_eq!(
        events,
        vec![
            DownloadEvent::Idle,
            DownloadEvent::Error("server error: 500".to_string())
        ]
    );
    assert!(music_files(library.music_dir()).is_empty());
    assert_eq!(
        library.progress(1),
        Some(DownloadStatus::Failed {
            reason: "server error: 500".to_string()
        })
    );

    let mut view = library.refresh().await.unwrap();
    library.decorate(&mut view);
    assert!(matches!(
        view.get(1).unwrap().download_status,
        DownloadStatus::Failed { .. }
    ));

    library.dismiss_failure(1);
    assert_eq!(library.progress(1), None);
}

#[tokio::test]
async fn test_one_download_per_track_and_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let mut payload = Payload::ok(&[1u8; 10]);
    payload.declared_length = Some(100);
    payload.stall = true;
    let library = library(&dir, Some(vec![remote(1, "A")]), vec![(1, payload)]).await;
    library.refresh().await.unwrap();

    let mut events = library.download(1).await.unwrap();
    assert_eq!(events.next().await, Some(DownloadEvent::Idle));
    assert_eq!(events.next().await, Some(DownloadEvent::Progress(10)));
    assert_eq!(
        library.progress(1),
        Some(DownloadStatus::Downloading { progress: 10 })
    );

    let mut view = library.offline_view().await.unwrap();
    library.decorate(&mut view);
    assert_eq!(
        view.get(1).unwrap().download_status,
        DownloadStatus::Downloading { progress: 10 }
    );

    assert!(matches!(
        library.download(1).await,
        Err(SyncError::InvalidState(_))
    ));
    assert!(matches!(library.delete(1).await, Err(SyncError::InvalidState(_))));

    assert!(library.cancel(1));
    assert_eq!(
        events.next().await,
        Some(DownloadEvent::Error("Operation cancelled".to_string()))
    );
    drop(events);

    wait_until_idle(&library, 1).await;
    assert!(music_files(library.music_dir()).is_empty());
    assert!(!library.cancel(1));

    let record = library.ledger().fetch_by_id(1).await.unwrap().unwrap();
    assert!(!record.is_downloaded);
}

#[tokio::test]
async fn test_abandoned_download_releases_track() {
    let dir = tempfile::tempdir().unwrap();
    let mut payload = Payload::ok(&[1u8; 10]);
    payload.declared_length = Some(100);
    payload.stall = true;
    let library = library(&dir, Some(vec![remote(1, "A")]), vec![(1, payload)]).await;
    library.refresh().await.unwrap();

    let mut events = library.download(1).await.unwrap();
    assert_eq!(events.next().await, Some(DownloadEvent::Idle));
    drop(events);

    assert_eq!(library.progress(1), None);
    wait_until_idle(&library, 1).await;
    assert!(music_files(library.music_dir()).is_empty());
    assert_eq!(library.active_downloads(), 0);
}

#[tokio::test]
async fn test_unknown_track_cannot_download() {
    let dir = tempfile::tempdir().unwrap();
    let library = library(&dir, Some(Vec::new()), Vec::new()).await;

    assert!(matches!(library.download(42).await, Err(SyncError::NotFound(_))));
}

#[tokio::test]
async fn test_offline_refresh_matches_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let library = library(
        &dir,
        Some(vec![remote(2, "B"), remote(1, "A")]),
        vec![(2, Payload::ok(b"payload"))],
    )
    .await;
    library.refresh().await.unwrap();
    library.download(2).await.unwrap().wait().await.unwrap();

    *library_catalog(&library) = None;
    library.set_mode(ViewMode::DownloadedOnly);

    let fallback = library.refresh().await.unwrap();
    let offline = library.offline_view().await.unwrap();
    assert!(fallback.is_offline());
    assert_eq!(fallback.tracks, offline.tracks);
    assert_eq!(fallback.tracks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2]);

    library.set_mode(ViewMode::All);
    let all = library.refresh().await.unwrap();
    assert_eq!(all.tracks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2]);
}

#[tokio::test]
async fn test_refresh_twice_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let library = library(&dir, Some(vec![remote(3, "C"), remote(1, "A")]), Vec::new()).await;

    let first = library.refresh().await.unwrap();
    let second = library.refresh().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_download_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = {
        let library = library(&dir, Some(vec![remote(1, "A")]), vec![(1, Payload::ok(b"abc"))]).await;
        library.refresh().await.unwrap();
        let path = library.download(1).await.unwrap().wait().await.unwrap();
        library.ledger().clone().close().await.unwrap();
        path
    };

    let reopened = library(&dir, None, Vec::new()).await;
    let view = reopened.refresh().await.unwrap();
    assert!(view.is_offline());
    assert_eq!(view.get(1).unwrap().download_status.local_path(), Some(&path));
}

fn library_catalog(
    library: &Library<FakeCatalog, FakeFetcher>,
) -> std::sync::MutexGuard<'_, Option<Vec<RemoteTrack>>> {
    library.catalog().0.lock().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delete_right_after_success() {
    let dir = tempfile::tempdir().unwrap();
    let library = library(
        &dir,
        Some(vec![remote(1, "A")]),
        vec![(1, Payload::ok(&[3u8; 40]))],
    )
    .await;
    library.refresh().await.unwrap();

    for round in 0..100 {
        library.download(1).await.unwrap().wait().await.unwrap();
        assert!(library.delete(1).await.unwrap(), "round {}", round);
    }
    assert!(music_files(library.music_dir()).is_empty());
}

#[tokio::test]
async fn test_redownload_after_rename_leaves_one_payload() {
    let dir = tempfile::tempdir().unwrap();
    let library = library(
        &dir,
        Some(vec![remote(1, "Old Title")]),
        vec![(1, Payload::ok(b"payload"))],
    )
    .await;
    library.refresh().await.unwrap();
    let first = library.download(1).await.unwrap().wait().await.unwrap();
    assert!(first.ends_with("1_Old Title.mp3"));

    *library_catalog(&library) = Some(vec![remote(1, "New Title")]);
    let view = library.refresh().await.unwrap();
    assert_eq!(view.get(1).unwrap().download_status.local_path(), Some(&first));

    let second = library.download(1).await.unwrap().wait().await.unwrap();

    assert_eq!(music_files(library.music_dir()), vec!["1_New Title.mp3".to_string()]);
    assert_eq!(library.locate(1).await.unwrap(), Some(second.clone()));
    let record = library.ledger().fetch_by_id(1).await.unwrap().unwrap();
    assert_eq!(record.local_path.as_deref(), second.to_str());
}
