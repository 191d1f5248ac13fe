use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::config::MediClearConfig;
use crate::error::{MediClearError, Result, UpstreamError};

/// One piece of a multimodal request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline(mime_type: impl Into<String>, base64_data: impl Into<String>) -> Self {
        Part::InlineData {
            inline_data: Blob {
                mime_type: mime_type.into(),
                data: base64_data.into(),
            },
        }
    }
}

/// Base64 payload with its MIME type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: &'a [Part],
}

/// Text-in, text-out access to a generative model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Sends one request and returns the text of the first candidate.
    async fn generate(&self, parts: &[Part]) -> Result<String>;

    /// Whether a credential is available; callers use this as the backend-health flag.
    fn is_configured(&self) -> bool;
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, base_url: &str, model: &str) -> Self {
        Self::with_http_client(Client::new(), api_key, base_url, model)
    }

    pub fn with_http_client(
        http: Client,
        api_key: Option<String>,
        base_url: &str,
        model: &str,
    ) -> Self {
        Self {
            http,
            api_key,
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                model
            ),
        }
    }

    pub fn from_config(config: &MediClearConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_http_client(
            builder.build()?,
            config.api_key.clone(),
            &config.base_url,
            &config.model,
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, parts: &[Part]) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or(MediClearError::MissingApiKey)?;

        let payload = GenerateContentRequest {
            contents: [Content { parts }],
        };

        debug!("Sending {} part(s) to {}", parts.len(), self.endpoint);

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        // Error bodies are JSON too, but a proxy in between may answer with HTML.
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("API error ({})", status.as_u16()));
            let upstream = UpstreamError::new(status.as_u16(), message);
            error!(
                "Gemini request failed with {}: {}",
                upstream.status, upstream.message
            );
            return Err(upstream.into());
        }

        candidate_text(&body)
            .map(str::to_string)
            .ok_or(MediClearError::EmptyResponse)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

fn candidate_text(body: &Value) -> Option<&str> {
    body["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamErrorKind;
    use mockito::Matcher;
    use serde_json::json;

    const PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

    fn client_for(server: &mockito::ServerGuard, key: Option<&str>) -> GeminiClient {
        GeminiClient::new(key.map(str::to_string), &server.url(), "gemini-2.5-flash")
    }

    #[test]
    fn test_parts_serialize_in_gemini_shape() {
        let parts = vec![Part::text("hello"), Part::inline("image/jpeg", "AAAA")];
        let value = serde_json::to_value(&parts).unwrap();
        assert_eq!(
            value,
            json!([
                {"text": "hello"},
                {"inlineData": {"mimeType": "image/jpeg", "data": "AAAA"}}
            ])
        );
    }

    #[test]
    fn test_endpoint_uses_model_name() {
        let client = GeminiClient::new(None, "https://example.test/", "gemini-2.5-flash");
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert!(!client.is_configured());
    }

    #[tokio::test]
    async fn test_returns_first_candidate_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "contents": [{"parts": [{"text": "ping"}]}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{"content": {"parts": [{"text": "pong"}], "role": "model"}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server, Some("test-key"));
        let text = client.generate(&[Part::text("ping")]).await.unwrap();

        assert_eq!(text, "pong");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", PATH).expect(0).create_async().await;

        let client = client_for(&server, None);
        let err = client.generate(&[Part::text("ping")]).await.unwrap_err();

        assert!(matches!(err, MediClearError::MissingApiKey));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_is_mapped() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(429)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}})
                    .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server, Some("test-key"));
        let err = client.generate(&[Part::text("ping")]).await.unwrap_err();

        match &err {
            MediClearError::Upstream(upstream) => {
                assert_eq!(upstream.status, 429);
                assert_eq!(upstream.kind, UpstreamErrorKind::RateLimited);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("Rate limit"));
    }

    #[tokio::test]
    async fn test_invalid_key_is_mapped() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"error": {"code": 400, "message": "API key not valid. [API_KEY_INVALID]", "status": "INVALID_ARGUMENT"}})
                    .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server, Some("wrong"));
        let err = client.generate(&[Part::text("ping")]).await.unwrap_err();
        assert!(err.to_string().contains("Invalid API key"));
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(502)
            .with_body("<html>Bad Gateway</html>")
            .create_async()
            .await;

        let client = client_for(&server, Some("test-key"));
        let err = client.generate(&[Part::text("ping")]).await.unwrap_err();
        assert_eq!(err.to_string(), "API error (502)");
    }

    #[tokio::test]
    async fn test_empty_candidate_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"candidates": []}).to_string())
            .create_async()
            .await;

        let client = client_for(&server, Some("test-key"));
        let err = client.generate(&[Part::text("ping")]).await.unwrap_err();
        assert!(matches!(err, MediClearError::EmptyResponse));
    }
}
