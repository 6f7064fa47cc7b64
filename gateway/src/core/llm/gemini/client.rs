use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::llm::base::{GenerationError, GenerationResult, TextGenerator};

use super::config::GeminiConfig;
use super::messages::{ErrorResponse, GenerateContentRequest, GenerateContentResponse};

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Build a client with its own connection pool and the configured timeout.
    pub fn new(config: GeminiConfig) -> GenerationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::InvalidConfiguration(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn map_send_error(&self, error: reqwest::Error) -> GenerationError {
        if error.is_timeout() {
            GenerationError::Timeout(self.config.timeout)
        } else {
            GenerationError::RequestFailed(error.to_string())
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> GenerationResult<String> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let api_key = self.config.require_api_key()?;
        let body =
            GenerateContentRequest::single_turn(prompt, self.config.system_prompt.as_deref());

        debug!(
            model = %self.config.model,
            prompt_chars = prompt.chars().count(),
            "Sending Gemini generateContent request"
        );

        let response = self
            .client
            .post(self.config.generate_content_url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&raw)
                .map(|e| e.error.message)
                .unwrap_or(raw);
            warn!(status = status.as_u16(), "Gemini request failed: {message}");
            return Err(GenerationError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.config.timeout)
            } else {
                GenerationError::InvalidResponse(e.to_string())
            }
        })?;

        match parsed.first_text() {
            Some(text) => Ok(text),
            None => {
                if let Some(reason) = parsed.block_reason() {
                    warn!(reason = %reason, "Gemini blocked the prompt");
                }
                Err(GenerationError::EmptyResponse)
            }
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_client(base_url: &str) -> GeminiClient {
        GeminiClient::new(GeminiConfig {
            api_key: Some("test-gemini-key".to_string()),
            model: "gemini-test".to_string(),
            base_url: base_url.to_string(),
            system_prompt: None,
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_returns_first_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-gemini-key"))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "Hello"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "Hi there!"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = create_test_client(&server.uri());
        assert_eq!(client.generate("Hello").await.unwrap(), "Hi there!");
    }

    #[tokio::test]
    async fn test_empty_prompt_skips_backend() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = create_test_client(&server.uri());
        assert!(matches!(
            client.generate("   ").await,
            Err(GenerationError::EmptyPrompt)
        ));
    }

    #[tokio::test]
    async fn test_backend_error_message_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}
            })))
            .mount(&server)
            .await;

        let client = create_test_client(&server.uri());
        match client.generate("Hello").await {
            Err(GenerationError::Backend { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_candidates_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&server)
            .await;

        let client = create_test_client(&server.uri());
        assert!(matches!(
            client.generate("Hello").await,
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"candidates": []}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = GeminiClient::new(GeminiConfig {
            api_key: Some("k".to_string()),
            base_url: server.uri(),
            timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();

        assert!(matches!(
            client.generate("Hello").await,
            Err(GenerationError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = GeminiClient::new(GeminiConfig::default()).unwrap();
        assert!(matches!(
            client.generate("Hello").await,
            Err(GenerationError::InvalidConfiguration(_))
        ));
    }
}
