//! Render scheduling for the preview surface.
//!
//! Every published snapshot invalidates the current sheet. Invalidations are
//! debounced over a short quiet window, then rendered with the snapshot's
//! revision as generation token: a render that is superseded mid-flight is
//! abandoned before it can flash stale content onto the surface.

use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc::Sender;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::events::FramePresented;
use crate::render;
use crate::state::Snapshot;
use crate::surface::PreviewSurface;

pub async fn run(
    mut snapshot_rx: watch::Receiver<Snapshot>,
    mut surface: PreviewSurface,
    debounce: Duration,
    presented_tx: Sender<FramePresented>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut rng = StdRng::from_os_rng();
    info!(
        debounce = %humantime::format_duration(debounce),
        output = %surface.output_path().display(),
        "compositor ready"
    );

    // First paint from the initial snapshot, so the sheet (or its placeholder
    // fill) exists before any state change arrives.
    let initial = snapshot_rx.borrow_and_update().clone();
    render_pass(&initial, &snapshot_rx, &mut surface, &mut rng, &presented_tx).await;

    loop {
        select! {
            _ = cancel.cancelled() => break,

            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                // Quiet window: further snapshots published while we wait are
                // absorbed into a single render of the latest revision.
                select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(debounce) => {}
                }
                let snapshot = snapshot_rx.borrow_and_update().clone();
                render_pass(&snapshot, &snapshot_rx, &mut surface, &mut rng, &presented_tx).await;
            }
        }
    }
    Ok(())
}

async fn render_pass(
    snapshot: &Snapshot,
    snapshot_rx: &watch::Receiver<Snapshot>,
    surface: &mut PreviewSurface,
    rng: &mut StdRng,
    presented_tx: &Sender<FramePresented>,
) {
    let revision = snapshot.revision;
    if snapshot.pattern.is_none() && snapshot.subjects.is_empty() && surface.is_placeholder() {
        debug!(revision, "nothing uploaded or generated yet; placeholder state");
    }

    let superseded = || snapshot_rx.borrow().revision != revision;
    let Some(frame) = render::compose(snapshot, rng, superseded).await else {
        debug!(revision, "render superseded; abandoned");
        return;
    };

    let (w, h) = frame.dimensions();
    let (fw, fh) = surface.fitted_size(w, h);
    let (ox, oy) = surface.centered_offset(fw, fh);
    match surface.present(frame) {
        Ok(()) => {
            info!(
                revision,
                sheet = format!("{w}x{h}"),
                fitted = format!("{fw}x{fh}+{ox}+{oy}"),
                "sheet presented"
            );
            let _ = presented_tx.send(FramePresented { revision }).await;
        }
        Err(Error::SurfaceUnavailable(path)) => {
            // Degrade to a no-op render; the next state change retries.
            warn!(path = %path.display(), "surface unavailable; skipping present");
        }
        Err(err) => {
            warn!(error = %err, "present failed");
        }
    }
}
