//! Vision-model decision oracle over the Gemini `generateContent` API.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::AcquireError;
use super::agent::{AgentAction, DecisionOracle, parse_agent_action};
use crate::http::{HttpTimeouts, build_http_client};
use crate::user_agent;

const SERVICE: &str = "Gemini";

/// Default API base URL.
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
/// Default model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    fn reply_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        Some(text).filter(|t| !t.trim().is_empty())
    }
}

/// Sends the screenshot and instruction to a Gemini model and parses its reply.
pub struct GeminiOracle {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiOracle {
    /// Creates an oracle for `model` at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Client`] when the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, AcquireError> {
        let client = build_http_client(SERVICE, &user_agent::default_api_user_agent(), timeouts)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

impl std::fmt::Debug for GeminiOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiOracle")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DecisionOracle for GeminiOracle {
    #[tracing::instrument(skip_all, fields(model = %self.model))]
    async fn next_action(
        &self,
        screenshot: &[u8],
        instruction: &str,
    ) -> Result<AgentAction, AcquireError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": instruction },
                    { "inline_data": { "mime_type": "image/png", "data": STANDARD.encode(screenshot) } }
                ]
            }]
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AcquireError::oracle(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquireError::oracle(format!("HTTP {}", status.as_u16())));
        }
        let decoded: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AcquireError::oracle(format!("undecodable reply: {e}")))?;

        let Some(text) = decoded.reply_text() else {
            debug!("empty oracle reply");
            return Ok(AgentAction::Invalid(String::new()));
        };
        debug!(reply = %text, "oracle replied");
        Ok(parse_agent_action(&text))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn oracle(base: &str) -> GeminiOracle {
        GeminiOracle::new(base, "secret-key", "vision-test", HttpTimeouts::from_secs(5, 5)).unwrap()
    }

    #[test]
    fn test_debug_hides_api_key() {
        let rendered = format!("{:?}", oracle("http://127.0.0.1:9"));
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("vision-test"));
    }

    #[test]
    fn test_reply_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"action\":" }, { "text": "\"FAIL\"}" }] } }]
        }))
        .unwrap();
        assert_eq!(response.reply_text().as_deref(), Some("{\"action\":\"FAIL\"}"));

        let empty: GenerateResponse = serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert!(empty.reply_text().is_none());
    }

    #[tokio::test]
    async fn test_next_action_posts_inline_screenshot() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .and(path("/v1beta/models/vision-test:generateContent"))
            .and(header("x-goog-api-key", "secret-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "```json\n{\"action\":\"CLICK\",\"xpath\":\"//a\"}\n```" }] }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let action = oracle(&server.uri())
            .next_action(b"\x89PNG", "find the pdf")
            .await
            .unwrap();
        assert_eq!(action, AgentAction::Click("//a".to_string()));

        let requests = server.received_requests().await.unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            sent["contents"][0]["parts"][1]["inline_data"]["data"],
            STANDARD.encode(b"\x89PNG")
        );
    }

    #[tokio::test]
    async fn test_server_error_is_oracle_error() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = oracle(&server.uri())
            .next_action(b"png", "find the pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::Oracle { .. }));
    }
}
