use serde::{Deserialize, Serialize};

use crate::pipeline::{ProblemInfo, SolutionResult};

/// Which panel the host window is showing. Decides whether a processing run
/// consumes the primary queue (fresh solve) or the extra queue (debug pass).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Queue,
    Solutions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressUpdate {
    pub message: String,
    pub progress: u8,
}

/// Outbound signals to the UI boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload")]
pub enum ProcessingEvent {
    InitialStart,
    NoScreenshots,
    ProblemExtracted(ProblemInfo),
    SolutionSuccess(SolutionResult),
    InitialSolutionError(String),
    DebugStart,
    DebugSuccess(SolutionResult),
    DebugError(String),
    RefinementStart,
    RefinementSuccess(SolutionResult),
    RefinementError(String),
    ApiKeyInvalid,
    Progress(ProgressUpdate),
}

impl ProcessingEvent {
    pub fn progress(message: impl Into<String>, progress: u8) -> Self {
        Self::Progress(ProgressUpdate {
            message: message.into(),
            progress,
        })
    }
}
