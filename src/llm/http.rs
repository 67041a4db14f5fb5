//! OpenAI-compatible chat-completions client over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::model::TokenUsage;

/// HTTP-backed LLM provider.
///
/// Targets any OpenAI-compatible `/chat/completions` endpoint (Together AI
/// in production). A bounded request timeout keeps a hung provider from
/// blocking the pipeline.
pub struct HttpProvider {
    client: reqwest::Client,
    url: String,
    api_key: SecretString,
    model: String,
}

impl HttpProvider {
    pub fn new(
        url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
            model: model.into(),
        })
    }

    /// Serialize a request into the provider's wire format.
    fn build_payload(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "stream": false,
        });
        if let Some(top_k) = request.top_k {
            payload["top_k"] = top_k.into();
        }
        if let Some(penalty) = request.repetition_penalty {
            payload["repetition_penalty"] = penalty.into();
        }
        if !request.stop.is_empty() {
            payload["stop"] = serde_json::json!(request.stop);
        }
        payload
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let payload = self.build_payload(&request);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatCompletionBody =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                reason: format!("malformed JSON body: {e}"),
            })?;

        let content = body
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::InvalidResponse {
                reason: "response has no completion content".to_string(),
            })?;

        let usage = body
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        debug!(
            model = %self.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Completion received"
        );

        Ok(CompletionResponse { content, usage })
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatCompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;

    fn provider() -> HttpProvider {
        HttpProvider::new(
            "https://example.test/v1/chat/completions",
            SecretString::from("test-key"),
            "test-model",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn payload_carries_sampling_parameters() {
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")])
            .with_max_tokens(3)
            .with_temperature(0.2)
            .with_top_p(0.9)
            .with_top_k(50)
            .with_repetition_penalty(1.0)
            .with_stop(&["<|im_end|>", "<|endoftext|>"]);

        let payload = provider().build_payload(&request);
        assert_eq!(payload["model"], "test-model");
        assert_eq!(payload["max_tokens"], 3);
        assert_eq!(payload["stream"], false);
        assert_eq!(payload["top_k"], 50);
        assert_eq!(payload["stop"][1], "<|endoftext|>");
        assert_eq!(payload["messages"][0]["role"], "user");
    }

    #[test]
    fn payload_omits_unset_optionals() {
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        let payload = provider().build_payload(&request);
        assert!(payload.get("top_k").is_none());
        assert!(payload.get("repetition_penalty").is_none());
        assert!(payload.get("stop").is_none());
    }

    #[test]
    fn usage_defaults_to_zero_when_absent() {
        let body: ChatCompletionBody = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "42"}}]}"#,
        )
        .unwrap();
        assert!(body.usage.is_none());
        assert_eq!(body.choices[0].message.content.as_deref(), Some("42"));
    }
}
