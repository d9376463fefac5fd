use std::path::{Path, PathBuf};

use crate::events::{ProcessingEvent, View};

/// Window-side collaborator: event sink, active view, and the externally
/// held "current displayed solution". The UI is the durable holder of the
/// current solution; the core reads it back rather than caching its own copy.
pub trait UiBridge: Send + Sync {
    /// Whether the frontend has finished bootstrapping. Polled with a bounded
    /// wait before reading UI-held values.
    fn is_initialized(&self) -> bool;

    /// The solution currently displayed, as the UI serialized it.
    fn current_solution(&self) -> anyhow::Result<Option<serde_json::Value>>;

    fn view(&self) -> View;

    fn set_view(&self, view: View);

    /// UI-held language preference, consulted only when config carries none.
    fn preferred_language(&self) -> Option<String>;

    fn send(&self, event: ProcessingEvent);
}

/// Screenshot capture subsystem: two ordered queues plus preview generation.
pub trait ScreenshotSource: Send + Sync {
    /// Primary queue, processed for a fresh extract+solve run.
    fn queue(&self) -> Vec<PathBuf>;

    /// Secondary queue of debug screenshots (errors, failing tests).
    fn extra_queue(&self) -> Vec<PathBuf>;

    fn preview(&self, path: &Path) -> anyhow::Result<String>;

    /// Invoked after a successful extract+solve cycle so stale debug shots
    /// do not leak into the next session.
    fn clear_extra_queue(&self);
}
