pub mod gemini;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{ApiProvider, AppConfig};

pub const COMPLETION_TEMPERATURE: f32 = 0.2;
pub const MAX_OUTPUT_TOKENS: u32 = 4000;

/// Provider-agnostic request: one system/context instruction, zero or more
/// base64 PNG payloads, and a text prompt.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_instruction: String,
    pub prompt: String,
    pub images: Vec<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl CompletionRequest {
    pub fn new(model: String, system_instruction: String, prompt: String) -> Self {
        Self {
            model,
            system_instruction,
            prompt,
            images: Vec::new(),
            temperature: COMPLETION_TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API key not configured")]
    NotConfigured,

    #[error("invalid API key")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited,

    #[error("upstream server error (status {status})")]
    ServerError { status: u16 },

    #[error("empty response from provider")]
    EmptyResponse,

    #[error("request canceled")]
    Canceled,

    #[error("{0}")]
    Unknown(String),
}

impl ProviderError {
    pub fn user_message(&self) -> String {
        match self {
            Self::NotConfigured => {
                "API key not configured. Please check your settings.".to_string()
            }
            Self::Unauthorized => "Invalid API key. Please check your settings.".to_string(),
            Self::RateLimited => {
                "API rate limit exceeded or insufficient credits. Please try again later."
                    .to_string()
            }
            Self::ServerError { .. } => "Server error. Please try again later.".to_string(),
            Self::EmptyResponse => "Empty response from the API. Please try again.".to_string(),
            Self::Canceled => "Request was canceled.".to_string(),
            Self::Unknown(msg) => msg.clone(),
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 => Self::Unauthorized,
            429 => Self::RateLimited,
            s if s >= 500 => Self::ServerError { status: s },
            s => Self::Unknown(format!("API error ({}): {}", s, body)),
        }
    }
}

/// One network round trip to a text-completion backend. Implementations must
/// honor the cancellation token across the call.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError>;
}

/// The configured backend. At most one variant is live at a time; rebuilt
/// whenever configuration changes.
#[derive(Clone)]
pub enum ProviderClient {
    OpenAi(openai::OpenAiBackend),
    Gemini(gemini::GeminiBackend),
}

impl ProviderClient {
    /// Build the client for the configured provider. Returns `None` when the
    /// active provider has no usable credential.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        if !config.has_api_key() {
            log::warn!(
                "No API key available, {} client not initialized",
                config.provider.label()
            );
            return None;
        }

        let client = match config.provider {
            ApiProvider::OpenAi => {
                Self::OpenAi(openai::OpenAiBackend::new(config.api_key.clone()))
            }
            ApiProvider::Gemini => {
                Self::Gemini(gemini::GeminiBackend::new(config.api_key.clone()))
            }
        };
        log::info!("{} client initialized", config.provider.label());
        Some(client)
    }
}

#[async_trait]
impl CompletionBackend for ProviderClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        match self {
            Self::OpenAi(backend) => backend.complete(request, cancel).await,
            Self::Gemini(backend) => backend.complete(request, cancel).await,
        }
    }
}
