use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tokio::select;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SheetSettings;
use crate::error::Error;
use crate::events::{InboxEvent, PatternOutcome, ProcessSubject, SettingsChange, SubjectUpdate};
use crate::service::GenerateService;

/// Opaque identity of an uploaded subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubjectId(u64);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subject-{}", self.0)
    }
}

/// Festive accessory applied by the generation service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HatType {
    #[default]
    SantaHat,
    ElfHat,
    ReindeerAntlers,
    WinterBeanie,
    TopHat,
}

impl HatType {
    /// Human wording used inside the service prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SantaHat => "Santa Hat",
            Self::ElfHat => "Elf Hat",
            Self::ReindeerAntlers => "Reindeer Antlers",
            Self::WinterBeanie => "Winter Beanie",
            Self::TopHat => "Top Hat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SubjectOptions {
    pub add_hat: bool,
    pub hat_type: HatType,
    pub remove_background: bool,
}

impl Default for SubjectOptions {
    fn default() -> Self {
        Self {
            add_hat: true,
            hat_type: HatType::SantaHat,
            remove_background: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SubjectImage {
    pub id: SubjectId,
    pub source: PathBuf,
    /// Encoded bytes of the processed image; `None` until processing succeeds.
    pub processed: Option<Arc<Vec<u8>>>,
    pub status: SubjectStatus,
    pub options: SubjectOptions,
}

impl SubjectImage {
    /// A subject is drawable once processing completed with an image.
    pub fn is_ready(&self) -> bool {
        self.status == SubjectStatus::Completed && self.processed.is_some()
    }
}

/// Immutable view of the session, published on every mutation.
///
/// `revision` increases monotonically and doubles as the render-generation
/// token: a render captures it at start and abandons itself once a newer
/// snapshot has been published.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub revision: u64,
    pub subjects: Arc<Vec<SubjectImage>>,
    pub pattern: Option<Arc<Vec<u8>>>,
    pub settings: SheetSettings,
}

impl Snapshot {
    pub fn empty(settings: SheetSettings) -> Self {
        Self {
            revision: 0,
            subjects: Arc::new(Vec::new()),
            pattern: None,
            settings,
        }
    }
}

/// Single-owner session state. All mutations go through the named operations
/// below; each one bumps the revision.
#[derive(Debug)]
pub struct AppState {
    subjects: Vec<SubjectImage>,
    pattern: Option<Arc<Vec<u8>>>,
    settings: SheetSettings,
    defaults: SubjectOptions,
    next_id: u64,
    revision: u64,
}

impl AppState {
    pub fn new(settings: SheetSettings, defaults: SubjectOptions) -> Self {
        Self {
            subjects: Vec::new(),
            pattern: None,
            settings,
            defaults,
            next_id: 0,
            revision: 0,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            revision: self.revision,
            subjects: Arc::new(self.subjects.clone()),
            pattern: self.pattern.clone(),
            settings: self.settings.clone(),
        }
    }

    pub fn subject(&self, id: SubjectId) -> Option<&SubjectImage> {
        self.subjects.iter().find(|s| s.id == id)
    }

    fn subject_mut(&mut self, id: SubjectId) -> Option<&mut SubjectImage> {
        self.subjects.iter_mut().find(|s| s.id == id)
    }

    /// Register an uploaded photo. Duplicate paths are ignored.
    pub fn add_subject(&mut self, source: PathBuf) -> Option<SubjectId> {
        if self.subjects.iter().any(|s| s.source == source) {
            return None;
        }
        let id = SubjectId(self.next_id);
        self.next_id += 1;
        self.subjects.push(SubjectImage {
            id,
            source,
            processed: None,
            status: SubjectStatus::Pending,
            options: self.defaults,
        });
        self.revision += 1;
        Some(id)
    }

    /// Remove the subject uploaded from `source`, if any. An in-flight
    /// processing call for it keeps running; its outcome is discarded by
    /// [`AppState::apply_outcome`].
    pub fn remove_subject_at(&mut self, source: &Path) -> Option<SubjectId> {
        let pos = self.subjects.iter().position(|s| s.source == source)?;
        let removed = self.subjects.remove(pos);
        self.revision += 1;
        Some(removed.id)
    }

    /// Edit a subject's options. Editing after completion (or failure) resets
    /// the subject to pending so it gets reprocessed; edits that change
    /// nothing are no-ops. Returns true when the subject must be resubmitted.
    pub fn update_options(&mut self, id: SubjectId, options: SubjectOptions) -> bool {
        let Some(subject) = self.subject_mut(id) else {
            return false;
        };
        if subject.options == options {
            return false;
        }
        subject.options = options;
        subject.processed = None;
        subject.status = SubjectStatus::Pending;
        self.revision += 1;
        true
    }

    /// Apply new default options to every subject, returning the jobs to
    /// resubmit.
    pub fn set_defaults(&mut self, options: SubjectOptions) -> Vec<ProcessSubject> {
        self.defaults = options;
        let ids: Vec<SubjectId> = self.subjects.iter().map(|s| s.id).collect();
        let mut jobs = Vec::new();
        for id in ids {
            if self.update_options(id, options) {
                jobs.push(self.job_for(id).expect("subject just updated"));
            }
        }
        jobs
    }

    pub fn set_settings(&mut self, sheet: SheetSettings) -> bool {
        if self.settings == sheet {
            return false;
        }
        self.settings = sheet;
        self.revision += 1;
        true
    }

    /// Install a freshly generated pattern tile.
    pub fn set_pattern(&mut self, bytes: Vec<u8>) {
        self.pattern = Some(Arc::new(bytes));
        self.revision += 1;
    }

    pub fn pattern_prompt(&self) -> &str {
        &self.settings.pattern_prompt
    }

    fn job_for(&self, id: SubjectId) -> Option<ProcessSubject> {
        self.subject(id).map(|s| ProcessSubject {
            id: s.id,
            source: s.source.clone(),
            options: s.options,
        })
    }

    /// Mark a submitted subject as processing. Ignored when the subject was
    /// removed in the meantime or is no longer pending.
    pub fn begin_processing(&mut self, id: SubjectId) -> bool {
        match self.subject_mut(id) {
            Some(s) if s.status == SubjectStatus::Pending => {
                s.status = SubjectStatus::Processing;
                self.revision += 1;
                true
            }
            _ => false,
        }
    }

    /// Apply a finished processing call. The outcome is discarded when the
    /// subject no longer exists or its options changed after submission, so a
    /// late callback can never resurrect a removed id or mask a stale edit.
    pub fn apply_outcome(
        &mut self,
        id: SubjectId,
        submitted: SubjectOptions,
        result: Result<Vec<u8>, Error>,
    ) -> bool {
        let Some(subject) = self.subject_mut(id) else {
            debug!(%id, "discarding outcome for removed subject");
            return false;
        };
        if subject.options != submitted {
            debug!(%id, "discarding stale outcome after options edit");
            return false;
        }
        match result {
            Ok(bytes) => {
                subject.processed = Some(Arc::new(bytes));
                subject.status = SubjectStatus::Completed;
            }
            Err(err) => {
                warn!(%id, error = %err, "subject processing failed");
                subject.processed = None;
                subject.status = SubjectStatus::Failed;
            }
        }
        self.revision += 1;
        true
    }
}

/// Owns the [`AppState`] and serializes every mutation through its own loop.
///
/// Publishes a fresh [`Snapshot`] after each mutation and feeds the serialized
/// processing queue. Pattern generation runs on a spawned task so slow service
/// calls never block state updates.
pub async fn run<S>(
    settings: SheetSettings,
    defaults: SubjectOptions,
    service: Arc<S>,
    mut inbox_rx: Receiver<InboxEvent>,
    mut settings_rx: Receiver<SettingsChange>,
    mut update_rx: Receiver<SubjectUpdate>,
    to_processor: Sender<ProcessSubject>,
    snapshot_tx: watch::Sender<Snapshot>,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    S: GenerateService + Send + Sync + 'static,
{
    let mut state = AppState::new(settings, defaults);
    let (pattern_tx, mut pattern_rx) = tokio::sync::mpsc::channel::<PatternOutcome>(1);
    let mut generating_pattern = false;
    // The settings feed is optional; when its producer is gone we keep
    // serving the other channels instead of shutting down.
    let mut settings_open = true;

    // First-load pattern generation, matching the explicit-action-only rule
    // for later regenerations.
    if !state.pattern_prompt().is_empty() {
        generating_pattern = true;
        spawn_pattern_generation(
            service.clone(),
            state.pattern_prompt().to_owned(),
            pattern_tx.clone(),
        );
    }

    loop {
        select! {
            _ = cancel.cancelled() => break,

            maybe_ev = inbox_rx.recv() => {
                match maybe_ev {
                    Some(InboxEvent::SubjectAdded(path)) => {
                        if let Some(id) = state.add_subject(path.clone()) {
                            info!(%id, path = %path.display(), "subject uploaded");
                            publish(&snapshot_tx, &state);
                            if let Some(job) = state.job_for(id) {
                                let _ = to_processor.send(job).await;
                            }
                        }
                    }
                    Some(InboxEvent::SubjectRemoved(path)) => {
                        if let Some(id) = state.remove_subject_at(&path) {
                            info!(%id, path = %path.display(), "subject removed");
                            publish(&snapshot_tx, &state);
                        }
                    }
                    None => break,
                }
            }

            maybe_change = settings_rx.recv(), if settings_open => {
                let Some(change) = maybe_change else {
                    settings_open = false;
                    continue;
                };
                let prompt_changed = change.sheet.pattern_prompt != state.pattern_prompt();
                let mut dirty = state.set_settings(change.sheet);
                let jobs = state.set_defaults(change.subject_defaults);
                dirty |= !jobs.is_empty();
                if dirty {
                    publish(&snapshot_tx, &state);
                }
                for job in jobs {
                    let _ = to_processor.send(job).await;
                }
                // Prompt edits are the headless analogue of the regenerate
                // button; other settings never touch the pattern.
                if prompt_changed && !state.pattern_prompt().is_empty() && !generating_pattern {
                    generating_pattern = true;
                    spawn_pattern_generation(
                        service.clone(),
                        state.pattern_prompt().to_owned(),
                        pattern_tx.clone(),
                    );
                }
            }

            maybe_update = update_rx.recv() => {
                match maybe_update {
                    Some(SubjectUpdate::Begun { id }) => {
                        if state.begin_processing(id) {
                            publish(&snapshot_tx, &state);
                        }
                    }
                    Some(SubjectUpdate::Finished { id, options, result }) => {
                        if state.apply_outcome(id, options, result) {
                            publish(&snapshot_tx, &state);
                        }
                    }
                    None => break,
                }
            }

            maybe_pattern = pattern_rx.recv() => {
                generating_pattern = false;
                match maybe_pattern {
                    Some(PatternOutcome(Ok(bytes))) => {
                        info!(bytes = bytes.len(), "pattern generated");
                        state.set_pattern(bytes);
                        publish(&snapshot_tx, &state);
                    }
                    Some(PatternOutcome(Err(err))) => {
                        // Surfaced to the user; the previous pattern (if any)
                        // stays in place.
                        error!(error = %err, "pattern generation failed; keeping previous pattern");
                    }
                    None => {}
                }
            }
        }
    }

    Ok(())
}

fn publish(tx: &watch::Sender<Snapshot>, state: &AppState) {
    let _ = tx.send(state.snapshot());
}

fn spawn_pattern_generation<S>(
    service: Arc<S>,
    prompt: String,
    tx: Sender<PatternOutcome>,
) where
    S: GenerateService + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let result = service.generate_pattern(&prompt).await;
        let _ = tx.send(PatternOutcome(result)).await;
    });
}
