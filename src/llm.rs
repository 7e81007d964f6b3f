use crate::config::LLMConfig;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// A single chat-completion round trip. Implemented by [`OpenAiClient`] and by
/// canned clients in tests.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Provider/model label recorded in report metadata.
    fn describe(&self) -> String;
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    http: Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    debug: bool,
}

impl OpenAiClient {
    pub fn new(config: &LLMConfig, debug: bool) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("LLM API key not provided"))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("codewarden/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build LLM HTTP client")?;

        Ok(Self {
            http,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            debug,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        if self.debug {
            debug!(model = %self.model, url = %self.url, "LLM request");
            debug!("system prompt: {}", system_prompt);
            debug!("user prompt: {}", user_prompt);
        }

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("failed to call chat completions API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("LLM API error ({}): {}", status, body);
        }

        let chat: ChatCompletionResponse = response
            .json()
            .await
            .context("failed to parse chat completion response")?;
        let content = chat
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat completion response missing message content"))?;

        if self.debug {
            debug!("LLM raw response: {}", content);
        }

        Ok(content)
    }

    fn describe(&self) -> String {
        format!("openai-compatible/{}", self.model)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("static regex is valid"));

/// Greedy slice from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<&str> {
    JSON_OBJECT.find(text).map(|m| m.as_str())
}

/// Parse the JSON object embedded in an LLM answer, or `None` if there is none
/// or it does not fit `T`.
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Option<T> {
    let candidate = extract_json(text)?;
    match serde_json::from_str(candidate) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("discarding malformed LLM JSON: {}", e);
            None
        }
    }
}

/// Like [`parse_json_response`], falling back to `default()`. The flag is
/// `true` when the answer itself was used.
pub fn parse_or_default<T, F>(text: &str, default: F) -> (T, bool)
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    match parse_json_response(text) {
        Some(value) => (value, true),
        None => (default(), false),
    }
}

/// Cut `input` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        score: f64,
        #[serde(default)]
        notes: Vec<String>,
    }

    fn fallback() -> Verdict {
        Verdict {
            score: -1.0,
            notes: vec!["default".into()],
        }
    }

    #[test]
    fn extracts_object_wrapped_in_prose_and_fences() {
        let text = "Sure! Here you go:\n```json\n{\"score\": 7.5, \"notes\": [\"a\"]}\n```\nAnything else?";
        assert_eq!(extract_json(text), Some("{\"score\": 7.5, \"notes\": [\"a\"]}"));
        let (parsed, used): (Verdict, bool) = parse_or_default(text, fallback);
        assert_eq!(parsed.score, 7.5);
        assert!(used);
    }

    #[test]
    fn extraction_is_greedy_across_objects() {
        let text = "{\"a\": 1} and then {\"b\": 2}";
        assert_eq!(extract_json(text), Some(text));
        let parsed: Option<serde_json::Value> = parse_json_response(text);
        assert!(parsed.is_none());
    }

    #[test]
    fn malformed_answers_yield_the_default() {
        for text in [
            "",
            "no json here",
            "{",
            "}{",
            "{\"score\": \"high\"}",
            "{\"notes\": []}",
            "{\"score\": 1.0,,}",
        ] {
            let (parsed, used): (Verdict, bool) = parse_or_default(text, fallback);
            assert_eq!(parsed, fallback(), "input {text:?}");
            assert!(!used);
        }
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    fn client_for(server: &MockServer) -> OpenAiClient {
        let config = LLMConfig {
            api_key: Some("test-key".into()),
            base_url: server.url("/v1"),
            model: "test-model".into(),
            ..LLMConfig::default()
        };
        OpenAiClient::new(&config, false).unwrap()
    }

    #[tokio::test]
    async fn sends_bearer_authenticated_chat_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("Authorization", "Bearer test-key")
                    .json_body_partial(r#"{"model": "test-model"}"#);
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "{\"score\": 3}"}}]
                }));
            })
            .await;

        let answer = client_for(&server).complete("sys", "user").await.unwrap();
        mock.assert_async().await;
        assert_eq!(answer, "{\"score\": 3}");
    }

    #[tokio::test]
    async fn surfaces_http_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(401).body("bad key");
            })
            .await;

        let err = client_for(&server).complete("sys", "user").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn refuses_to_build_without_key() {
        let config = LLMConfig::default();
        assert!(OpenAiClient::new(&config, false).is_err());
    }
}
