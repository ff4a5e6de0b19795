//! Photo inbox task: the upload surface of the application.
//!
//! Dropping an image file into the watched directory registers it as a new
//! subject; deleting the file removes the subject. A startup scan picks up
//! photos that were already present.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use tokio::select;
use tokio::sync::mpsc::{self, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use walkdir::WalkDir;

use crate::events::InboxEvent;

#[instrument(skip(to_state, cancel), fields(root = %inbox.display()))]
pub async fn run(
    inbox: PathBuf,
    to_state: Sender<InboxEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    // 1) Startup scan: photos already in the inbox count as uploads, in a
    //    stable name order so restarts keep the subject ordering.
    let mut initial = Vec::<PathBuf>::new();
    for entry in WalkDir::new(&inbox)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path().to_path_buf();
        if is_image(&path) {
            initial.push(path);
        }
    }
    initial.sort();
    let discovered = initial.len();
    for path in initial {
        debug!(action = "startup_add", path = %path.display());
        let _ = to_state.send(InboxEvent::SubjectAdded(path)).await;
    }
    info!(discovered, "startup inbox scan complete");

    // 2) Bridge notify callback -> async channel
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<Event>>(128);
    let mut _watcher = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send(res);
    })?;
    match inbox.canonicalize() {
        Ok(abs) => info!(watching = %abs.display(), "inbox watcher initialized"),
        Err(_) => info!(watching = %inbox.display(), "inbox watcher initialized"),
    }
    _watcher.watch(&inbox, RecursiveMode::Recursive)?;

    // 3) Event loop
    loop {
        select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting inbox task");
                break;
            }

            Some(res) = watch_rx.recv() => match res {
                Ok(event) => {
                    debug!(kind = ?event.kind, paths = ?event.paths, "notify event");
                    match &event.kind {
                        EventKind::Create(CreateKind::File) => {
                            for p in event.paths.into_iter().filter(|p| is_image(p.as_path())) {
                                info!(path = %p.display(), "fs: upload (create)");
                                let _ = to_state.send(InboxEvent::SubjectAdded(p)).await;
                            }
                        }
                        EventKind::Remove(RemoveKind::File) => {
                            for p in event.paths.into_iter().filter(|p| is_image(p.as_path())) {
                                info!(path = %p.display(), "fs: remove");
                                let _ = to_state.send(InboxEvent::SubjectRemoved(p)).await;
                            }
                        }
                        EventKind::Modify(ModifyKind::Name(_)) => {
                            // macOS often reports moves as Name(Any). Decide per-path by existence.
                            for p in event.paths.into_iter().filter(|p| is_image(p.as_path())) {
                                if p.exists() {
                                    info!(path = %p.display(), "fs: upload (rename)");
                                    let _ = to_state.send(InboxEvent::SubjectAdded(p)).await;
                                } else {
                                    info!(path = %p.display(), "fs: remove (rename)");
                                    let _ = to_state.send(InboxEvent::SubjectRemoved(p)).await;
                                }
                            }
                        }
                        _ => {
                            debug!(kind = ?event.kind, "fs: ignored");
                        }
                    }
                }
                Err(err) => error!("watch error: {err}"),
            }
        }
    }
    Ok(())
}

#[inline]
pub fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(OsStr::to_str)
            .map(|s| s.to_ascii_lowercase()),
        Some(ref e) if ["jpg", "jpeg", "png", "webp"].contains(&e.as_str())
    )
}
