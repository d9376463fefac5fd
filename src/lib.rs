//! Screenshot-to-solution orchestration core: capture queues in, structured
//! solutions out. The desktop shell supplies the collaborator traits in
//! [`boundary`] and drives the [`orchestrator::Orchestrator`].

pub mod boundary;
pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod orchestrator;
pub mod pipeline;
pub mod provider;

pub use boundary::{ScreenshotSource, UiBridge};
pub use config::{ApiProvider, AppConfig, ConfigSource};
pub use error::ProcessingError;
pub use events::{ProcessingEvent, ProgressUpdate, View};
pub use orchestrator::Orchestrator;
pub use pipeline::{OptimizationFocus, ProblemInfo, ScreenshotInput, SolutionResult};
pub use provider::{CompletionBackend, CompletionRequest, ProviderClient, ProviderError};
