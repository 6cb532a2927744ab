//! Chat-completions client shared by the qualitative evaluator and the
//! profile extractor. Every call is constrained to a JSON schema and the reply
//! is decoded strictly.

use crate::error::EvaluationError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEN_MODEL: &str = "gpt-4o-mini";
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_URL.to_string(),
            api_key: None,
            model: DEFAULT_GEN_MODEL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaSpec<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaSpec<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, EvaluationError> {
        let base = Url::parse(&format!("{}/", config.base_url.trim_end_matches('/')))?;
        Ok(Self {
            client: Client::builder().timeout(config.timeout).build()?,
            endpoint: base.join("chat/completions")?,
            api_key: config.api_key,
            model: config.model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one system + user exchange and returns the raw reply text.
    /// Retries 429 and 5xx with exponential backoff (1s, 2s).
    pub async fn call(
        &self,
        system: &str,
        prompt: &str,
        schema_name: &str,
        schema: &Value,
    ) -> Result<String, EvaluationError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaSpec {
                    name: schema_name,
                    strict: true,
                    schema,
                },
            },
        };

        let mut last_error: Option<EvaluationError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying model call");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(self.endpoint.clone()).json(&body);
            if let Some(api_key) = &self.api_key {
                request = request.bearer_auth(api_key);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(error) => {
                    last_error = Some(EvaluationError::Http(error));
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                let text = response.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), "model endpoint returned retryable status");
                last_error = Some(EvaluationError::Api {
                    status: status.as_u16(),
                    message: text,
                });
                continue;
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
                    .map(|envelope| envelope.error.message)
                    .unwrap_or(text);
                return Err(EvaluationError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: ChatResponse = response.json().await?;
            let content = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .filter(|content| !content.trim().is_empty())
                .ok_or(EvaluationError::EmptyContent)?;

            debug!(model = %self.model, response_len = content.len(), "model call succeeded");
            return Ok(content);
        }

        Err(last_error.unwrap_or(EvaluationError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Calls the model and decodes the reply into `T`. A reply that does not
    /// decode is a schema violation, never a partial result.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        system: &str,
        prompt: &str,
        schema_name: &str,
        schema: &Value,
    ) -> Result<T, EvaluationError> {
        let text = self.call(system, prompt, schema_name, schema).await?;
        decode_json(&text)
    }
}

pub fn decode_json<T: DeserializeOwned>(text: &str) -> Result<T, EvaluationError> {
    serde_json::from_str(strip_json_fences(text))
        .map_err(|error| EvaluationError::Schema(error.to_string()))
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(stripped) => stripped
            .trim_start()
            .strip_suffix("```")
            .map(str::trim)
            .unwrap_or(stripped.trim_start()),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn undecodable_reply_is_a_schema_violation() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Shape {
            value: u8,
        }
        let error = decode_json::<Shape>("{\"value\": \"high\"}").unwrap_err();
        assert!(matches!(error, EvaluationError::Schema(_)));
    }

    #[test]
    fn client_builds_completion_endpoint_from_base() {
        let client = LlmClient::new(LlmConfig {
            base_url: "http://localhost:11434/v1/".to_string(),
            ..Default::default()
        })
        .expect("client builds");
        assert_eq!(client.endpoint.as_str(), "http://localhost:11434/v1/chat/completions");
    }
}
