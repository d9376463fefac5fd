use thiserror::Error;

use crate::provider::ProviderError;

/// Failure taxonomy for the screenshot-to-solution pipeline. Every terminal
/// failure maps to exactly one user-facing message via `user_message()`.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("no screenshots to process")]
    NoScreenshots,

    #[error("failed to load screenshot data")]
    ScreenshotReadFailure,

    #[error("{provider} API key not configured")]
    ProviderNotConfigured { provider: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("failed to parse problem information: {0}")]
    ExtractionParse(String),

    #[error("no current solution available")]
    MissingPriorSolution,

    #[error("canceled by the user")]
    Canceled,

    #[error("UI boundary error: {0}")]
    Ui(#[from] anyhow::Error),

    #[error("{0}")]
    Unknown(String),
}

impl ProcessingError {
    /// Human-readable message for the UI event sink.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoScreenshots => "No screenshots were found to process.".to_string(),
            Self::ScreenshotReadFailure => "Failed to load screenshot data.".to_string(),
            Self::ProviderNotConfigured { provider } => format!(
                "{} API key not configured or invalid. Please check your settings.",
                provider
            ),
            Self::Provider(e) => e.user_message(),
            Self::ExtractionParse(_) => {
                "Failed to parse problem information. Please try again or use clearer screenshots."
                    .to_string()
            }
            Self::MissingPriorSolution => {
                "No current solution available. Generate a solution first.".to_string()
            }
            Self::Canceled => "Processing was canceled by the user.".to_string(),
            Self::Ui(e) => format!("Internal error: {}", e),
            Self::Unknown(msg) => msg.clone(),
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(
            self,
            Self::Canceled | Self::Provider(ProviderError::Canceled)
        )
    }

    /// Secondary credential-failure signal: explicit auth classification, or
    /// keyword matching on provider/key names in an otherwise generic message.
    pub fn is_credential_error(&self) -> bool {
        match self {
            Self::ProviderNotConfigured { .. }
            | Self::Provider(ProviderError::Unauthorized)
            | Self::Provider(ProviderError::NotConfigured) => true,
            _ => {
                let msg = self.user_message().to_lowercase();
                msg.contains("api key") || msg.contains("openai") || msg.contains("gemini")
            }
        }
    }
}
