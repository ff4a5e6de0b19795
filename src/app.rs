//! Task wiring: one tokio task per concern, bounded channels between them,
//! a watch channel for state snapshots, and a shared cancellation token.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{RecursiveMode, Watcher, recommended_watcher};
use tokio::select;
use tokio::sync::mpsc::{self, Sender};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{self, Config};
use crate::events::{FramePresented, SettingsChange};
use crate::service::{GeminiClient, GenerateService};
use crate::state::{self, Snapshot};
use crate::surface::PreviewSurface;
use crate::tasks::{compositor, inbox, processor};

/// Run the application against the real generation service.
pub async fn run(cfg: Config, config_path: PathBuf, once: bool) -> Result<()> {
    let service =
        Arc::new(GeminiClient::new(&cfg.generation).context("building generation client")?);
    run_with_service(cfg, Some(config_path), once, service).await
}

/// Run with an injected service implementation. Tests use this to avoid the
/// network; `config_path` enables live settings reload when present.
pub async fn run_with_service<S>(
    cfg: Config,
    config_path: Option<PathBuf>,
    once: bool,
    service: Arc<S>,
) -> Result<()>
where
    S: GenerateService + Send + Sync + 'static,
{
    let cancel = CancellationToken::new();
    let (inbox_tx, inbox_rx) = mpsc::channel(64);
    let (settings_tx, settings_rx) = mpsc::channel(8);
    let (updates_tx, updates_rx) = mpsc::channel(16);
    let (jobs_tx, jobs_rx) = mpsc::channel(64);
    let (presented_tx, mut presented_rx) = mpsc::channel::<FramePresented>(8);
    let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::empty(cfg.sheet.clone()));

    let surface = PreviewSurface::new(cfg.output_path.clone(), cfg.viewport);

    let mut handles = Vec::new();
    handles.push(tokio::spawn(state::run(
        cfg.sheet.clone(),
        cfg.subject_defaults,
        service.clone(),
        inbox_rx,
        settings_rx,
        updates_rx,
        jobs_tx,
        snapshot_tx,
        cancel.clone(),
    )));
    handles.push(tokio::spawn(processor::run(
        service,
        jobs_rx,
        updates_tx,
        cancel.clone(),
    )));
    handles.push(tokio::spawn(inbox::run(
        cfg.photo_inbox_path.clone(),
        inbox_tx,
        cancel.clone(),
    )));
    handles.push(tokio::spawn(compositor::run(
        snapshot_rx,
        surface,
        cfg.render_debounce,
        presented_tx,
        cancel.clone(),
    )));
    if let Some(path) = config_path {
        handles.push(tokio::spawn(watch_config(
            path,
            settings_tx,
            cancel.clone(),
        )));
    }

    loop {
        select! {
            sig = tokio::signal::ctrl_c() => {
                if let Err(err) = sig {
                    warn!(error = %err, "ctrl-c handler failed");
                }
                info!("shutdown requested");
                break;
            }
            maybe = presented_rx.recv() => {
                match maybe {
                    Some(FramePresented { revision }) if once => {
                        info!(revision, "single render complete");
                        break;
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }
    }

    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

/// Watch the config file and feed reloaded settings into the state owner.
/// This is the headless stand-in for the control panel: editing the YAML is
/// how density, layout, paper size, prompt and subject options change.
async fn watch_config(
    path: PathBuf,
    to_state: Sender<SettingsChange>,
    cancel: CancellationToken,
) -> Result<()> {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<notify::Event>>(16);
    let mut _watcher = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send(res);
    })?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    _watcher.watch(dir, RecursiveMode::NonRecursive)?;
    let file_name = path.file_name().map(|n| n.to_owned());

    loop {
        select! {
            _ = cancel.cancelled() => break,

            Some(res) = watch_rx.recv() => match res {
                Ok(event) => {
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_owned()) == file_name);
                    if !ours || !matches!(event.kind, notify::EventKind::Create(_) | notify::EventKind::Modify(_)) {
                        continue;
                    }
                    match config::from_yaml_file(&path) {
                        Ok(cfg) => {
                            info!("configuration reloaded");
                            let _ = to_state
                                .send(SettingsChange {
                                    sheet: cfg.sheet,
                                    subject_defaults: cfg.subject_defaults,
                                })
                                .await;
                        }
                        Err(err) => {
                            // Keep running on the previous settings.
                            warn!(error = %err, "config reload failed; keeping current settings");
                        }
                    }
                }
                Err(err) => warn!("config watch error: {err}"),
            }
        }
    }
    Ok(())
}
