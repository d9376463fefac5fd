use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{CompletionBackend, CompletionRequest, ProviderError};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const TRANSPORT_RETRIES: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessageResponse,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessageResponse {
    content: Option<String>,
}

/// Chat-completion vision backend. Mixes prompt text and base64 image
/// references in a single user turn.
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: CHAT_COMPLETIONS_URL.to_string(),
        }
    }

    fn build_request(request: &CompletionRequest) -> OpenAiRequest {
        let user_content = if request.images.is_empty() {
            serde_json::Value::String(request.prompt.clone())
        } else {
            let mut parts = vec![serde_json::json!({
                "type": "text",
                "text": request.prompt,
            })];
            for data in &request.images {
                parts.push(serde_json::json!({
                    "type": "image_url",
                    "image_url": { "url": format!("data:image/png;base64,{}", data) },
                }));
            }
            serde_json::Value::Array(parts)
        };

        OpenAiRequest {
            model: request.model.clone(),
            messages: vec![
                OpenAiMessage {
                    role: "system".to_string(),
                    content: serde_json::Value::String(request.system_instruction.clone()),
                },
                OpenAiMessage {
                    role: "user".to_string(),
                    content: user_content,
                },
            ],
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
        }
    }

    async fn send_once(&self, body: &OpenAiRequest) -> Result<String, RequestFailure> {
        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(RequestFailure::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, text).into());
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Unknown(format!("Failed to parse OpenAI response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::EmptyResponse.into())
    }
}

/// Distinguishes connection-level failures (retried) from classified API
/// failures (returned as-is).
enum RequestFailure {
    Transport(reqwest::Error),
    Api(ProviderError),
}

impl From<ProviderError> for RequestFailure {
    fn from(e: ProviderError) -> Self {
        Self::Api(e)
    }
}

#[async_trait::async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let body = Self::build_request(request);

        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ProviderError::Canceled);
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Canceled),
                res = self.send_once(&body) => res,
            };

            match outcome {
                Ok(text) => return Ok(text),
                Err(RequestFailure::Api(e)) => return Err(e),
                Err(RequestFailure::Transport(e)) => {
                    if attempt >= TRANSPORT_RETRIES {
                        return Err(ProviderError::Unknown(format!(
                            "OpenAI request failed: {}",
                            e
                        )));
                    }
                    attempt += 1;
                    log::warn!(
                        "OpenAI request failed ({}), retrying (attempt {}/{})",
                        e,
                        attempt,
                        TRANSPORT_RETRIES
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ProviderError::Canceled),
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }
    }
}
