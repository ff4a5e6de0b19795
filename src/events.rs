use std::path::PathBuf;

use crate::config::SheetSettings;
use crate::error::Error;
use crate::state::{SubjectId, SubjectOptions};

/// Filesystem activity in the photo inbox.
#[derive(Debug)]
pub enum InboxEvent {
    SubjectAdded(PathBuf),
    SubjectRemoved(PathBuf),
}

/// A reloaded configuration relevant to the running session.
#[derive(Debug)]
pub struct SettingsChange {
    pub sheet: SheetSettings,
    pub subject_defaults: SubjectOptions,
}

/// One subject submission for the serialized processing queue.
#[derive(Debug)]
pub struct ProcessSubject {
    pub id: SubjectId,
    pub source: PathBuf,
    pub options: SubjectOptions,
}

/// Progress reported back by the processing queue.
#[derive(Debug)]
pub enum SubjectUpdate {
    Begun {
        id: SubjectId,
    },
    Finished {
        id: SubjectId,
        /// Options the job was submitted with; a mismatch against the
        /// subject's current options means the result is stale.
        options: SubjectOptions,
        result: Result<Vec<u8>, Error>,
    },
}

/// Result of an asynchronous pattern generation request.
#[derive(Debug)]
pub struct PatternOutcome(pub Result<Vec<u8>, Error>);

/// Emitted by the compositor after a frame reached the output surface.
#[derive(Debug, Clone, Copy)]
pub struct FramePresented {
    pub revision: u64,
}
