use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use tracing::debug;

use super::http::{build_client, response_json_or_error, SKIP_CACHE_HEADER, SKIP_CACHE_VALUE};
use super::{CompletionRequest, TextCompletion};
use crate::config::TextApiConfig;
use crate::error::GenerationError;

const PROVIDER: &str = "OpenAI";

/// Chat-completions client used for prompt decomposition.
pub struct OpenAiChatDecomposer {
    api_base: String,
    api_key: String,
    model: String,
    http: HttpClient,
}

impl OpenAiChatDecomposer {
    pub fn new(config: &TextApiConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            http: build_client(timeout)?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

fn chat_payload(model: &str, request: &CompletionRequest<'_>) -> Value {
    json!({
        "model": model,
        "messages": [
            {"role": "system", "content": request.system},
            {"role": "user", "content": request.user},
        ],
        "temperature": request.temperature,
    })
}

/// `choices[0].message.content`, when it is a string.
fn extract_message_content(payload: &Value) -> Option<String> {
    payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl TextCompletion for OpenAiChatDecomposer {
    fn name(&self) -> &str {
        "openai"
    }

    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        let endpoint = self.endpoint();
        debug!(model = %self.model, %endpoint, "chat completion request");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .header(SKIP_CACHE_HEADER, SKIP_CACHE_VALUE)
            .json(&chat_payload(&self.model, request))
            .send()
            .with_context(|| format!("{PROVIDER} request failed ({endpoint})"))?;
        let payload = response_json_or_error(PROVIDER, response)?;
        extract_message_content(&payload).ok_or_else(|| {
            GenerationError::EmptyCompletion {
                provider: PROVIDER.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{chat_payload, extract_message_content};
    use crate::adapters::CompletionRequest;

    #[test]
    fn payload_carries_both_messages_and_temperature() {
        let payload = chat_payload(
            "gpt-4o-mini",
            &CompletionRequest {
                system: "be brief",
                user: "AI Wins",
                temperature: 0.7,
            },
        );
        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "AI Wins");
        let temperature = payload["temperature"].as_f64().unwrap_or_default();
        assert!((temperature - 0.7).abs() < 1e-6);
    }

    #[test]
    fn extracts_first_choice_content() {
        let payload = json!({
            "choices": [
                {"message": {"role": "assistant", "content": "AI Wins\nA trophy\ndark"}},
                {"message": {"role": "assistant", "content": "ignored"}},
            ]
        });
        assert_eq!(
            extract_message_content(&payload).as_deref(),
            Some("AI Wins\nA trophy\ndark")
        );
    }

    #[test]
    fn null_content_is_missing() {
        let payload = json!({"choices": [{"message": {"content": null}}]});
        assert_eq!(extract_message_content(&payload), None);
        assert_eq!(extract_message_content(&json!({})), None);
    }
}
