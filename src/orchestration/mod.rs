//! Wiring and command runners for the binary.

pub mod builder;
pub mod commands;
pub mod shutdown;

use thiserror::Error;

use crate::json_utils::JsonError;
use crate::network::ClassifyError;
use crate::recorder::RecordError;
use crate::state::StateError;

pub use builder::{build_tracker, build_tracker_with_classifier, TrackerParts};
pub use commands::{run_export_command, run_record_command, run_stats_command, run_track_command};
pub use shutdown::setup_shutdown_handler;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Classifier error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("JSON error: {0}")]
    Json(#[from] JsonError),

    #[error("Not a trackable page URL: {0}")]
    UntrackableUrl(String),
}

impl CommandError {
    /// Process exit code: 2 for bad input, 3 for I/O or storage, 4 for the classifier.
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::UntrackableUrl(_) => 2,
            CommandError::Classify(_) => 4,
            CommandError::Io(_)
            | CommandError::State(_)
            | CommandError::Record(_)
            | CommandError::Json(_) => 3,
        }
    }
}
