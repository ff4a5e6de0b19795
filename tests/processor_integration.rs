use std::future::Future;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wrap_studio::Error;
use wrap_studio::events::{ProcessSubject, SubjectUpdate};
use wrap_studio::service::GenerateService;
use wrap_studio::config::SheetSettings;
use wrap_studio::state::{AppState, SubjectOptions};

/// Counts concurrent in-flight calls so the serialization rule is checkable.
struct CountingService {
    in_flight: AtomicUsize,
    max_seen: AtomicUsize,
}

impl CountingService {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
        }
    }
}

impl GenerateService for CountingService {
    fn generate_pattern(&self, _prompt: &str) -> impl Future<Output = Result<Vec<u8>, Error>> + Send {
        async { Err(Error::PatternGeneration("not under test".into())) }
    }

    fn process_subject(
        &self,
        image: &[u8],
        _mime_type: &str,
        _options: &SubjectOptions,
    ) -> impl Future<Output = Result<Vec<u8>, Error>> + Send {
        let echoed = image.to_vec();
        async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(echoed)
        }
    }
}

fn write_photo(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    let img = RgbaImage::from_pixel(4, 4, Rgba([10, 200, 10, 255]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn job_for(state: &mut AppState, path: PathBuf) -> ProcessSubject {
    let id = state.add_subject(path.clone()).unwrap();
    ProcessSubject {
        id,
        source: path,
        options: state.subject(id).unwrap().options,
    }
}

async fn recv_update(rx: &mut mpsc::Receiver<SubjectUpdate>) -> SubjectUpdate {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout waiting for update")
        .expect("updates channel closed")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subjects_are_processed_one_at_a_time_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (jobs_tx, jobs_rx) = mpsc::channel(8);
    let (updates_tx, mut updates_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let service = Arc::new(CountingService::new());

    let handle = tokio::spawn(wrap_studio::tasks::processor::run(
        service.clone(),
        jobs_rx,
        updates_tx,
        cancel.clone(),
    ));

    let mut state = AppState::new(SheetSettings::default(), SubjectOptions::default());
    let first = job_for(&mut state, write_photo(&dir, "a.png"));
    let second = job_for(&mut state, write_photo(&dir, "b.png"));
    let (first_id, second_id) = (first.id, second.id);
    jobs_tx.send(first).await.unwrap();
    jobs_tx.send(second).await.unwrap();

    // Strict per-subject transition order: begun then finished, batch order
    // preserved.
    match recv_update(&mut updates_rx).await {
        SubjectUpdate::Begun { id } => assert_eq!(id, first_id),
        other => panic!("expected Begun, got {other:?}"),
    }
    match recv_update(&mut updates_rx).await {
        SubjectUpdate::Finished { id, result, .. } => {
            assert_eq!(id, first_id);
            assert!(result.is_ok());
        }
        other => panic!("expected Finished, got {other:?}"),
    }
    match recv_update(&mut updates_rx).await {
        SubjectUpdate::Begun { id } => assert_eq!(id, second_id),
        other => panic!("expected Begun, got {other:?}"),
    }
    match recv_update(&mut updates_rx).await {
        SubjectUpdate::Finished { id, result, .. } => {
            assert_eq!(id, second_id);
            assert!(result.is_ok());
        }
        other => panic!("expected Finished, got {other:?}"),
    }

    assert_eq!(
        service.max_seen.load(Ordering::SeqCst),
        1,
        "service saw concurrent submissions"
    );

    cancel.cancel();
    let _ = handle.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreadable_original_fails_that_subject_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let (jobs_tx, jobs_rx) = mpsc::channel(8);
    let (updates_tx, mut updates_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let service = Arc::new(CountingService::new());

    let handle = tokio::spawn(wrap_studio::tasks::processor::run(
        service,
        jobs_rx,
        updates_tx,
        cancel.clone(),
    ));

    let mut state = AppState::new(SheetSettings::default(), SubjectOptions::default());
    let missing = job_for(&mut state, dir.path().join("nope.png"));
    let good = job_for(&mut state, write_photo(&dir, "ok.png"));
    let (missing_id, good_id) = (missing.id, good.id);
    jobs_tx.send(missing).await.unwrap();
    jobs_tx.send(good).await.unwrap();

    match recv_update(&mut updates_rx).await {
        SubjectUpdate::Begun { id } => assert_eq!(id, missing_id),
        other => panic!("expected Begun, got {other:?}"),
    }
    match recv_update(&mut updates_rx).await {
        SubjectUpdate::Finished { id, result, .. } => {
            assert_eq!(id, missing_id);
            assert!(matches!(result, Err(Error::SubjectProcessing(_))));
        }
        other => panic!("expected Finished, got {other:?}"),
    }
    // The batch moves on to the next subject.
    match recv_update(&mut updates_rx).await {
        SubjectUpdate::Begun { id } => assert_eq!(id, good_id),
        other => panic!("expected Begun, got {other:?}"),
    }
    match recv_update(&mut updates_rx).await {
        SubjectUpdate::Finished { id, result, .. } => {
            assert_eq!(id, good_id);
            assert!(result.is_ok());
        }
        other => panic!("expected Finished, got {other:?}"),
    }

    cancel.cancel();
    let _ = handle.await;
}
