//! OpenAI-backed language model.

use async_trait::async_trait;
use tracing::debug;

use reweave_protocols::{CompletionRequest, LanguageModel, ModelError};

use crate::api::{ApiMessage, ApiRequest, ApiResponse, ResponseFormat};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI chat-completions model.
pub struct OpenAiModel {
    api_key: String,
    api_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiModel {
    pub fn new(api_key: String) -> Self {
        Self::with_url(api_key, DEFAULT_API_URL.to_string())
    }

    /// Create with a custom API URL (for OpenAI-compatible APIs and tests).
    pub fn with_url(api_key: String, api_url: String) -> Self {
        Self {
            api_key,
            api_url,
            model: DEFAULT_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_request(&self, request: &CompletionRequest) -> ApiRequest {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(ApiMessage::system(system.clone()));
        }
        messages.push(ApiMessage::user(request.prompt.clone()));

        ApiRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request.json.then(ResponseFormat::json_object),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError> {
        let api_request = self.build_request(&request);

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, message });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if let Some(usage) = &api_response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion received"
            );
        }

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelError::InvalidResponse("empty completion".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_api_url_constant() {
        assert_eq!(DEFAULT_API_URL, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_model_default_url() {
        let model = OpenAiModel::new("key".to_string());
        assert_eq!(model.api_url, DEFAULT_API_URL);
        assert_eq!(model.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_custom_model() {
        let model = OpenAiModel::new("key".to_string()).with_model("gpt-4o-mini");
        assert_eq!(model.model, "gpt-4o-mini");
    }

    #[test]
    fn test_build_request_plain() {
        let model = OpenAiModel::new("key".to_string());
        let api_request = model.build_request(&CompletionRequest::new("Hello"));
        assert_eq!(api_request.messages.len(), 1);
        assert_eq!(api_request.messages[0].role, "user");
        assert!(api_request.response_format.is_none());
    }

    #[test]
    fn test_build_request_system_and_json() {
        let model = OpenAiModel::new("key".to_string());
        let request = CompletionRequest::new("Hello")
            .with_system("Return only JSON.")
            .with_max_tokens(256)
            .with_json_output();
        let api_request = model.build_request(&request);
        assert_eq!(api_request.messages.len(), 2);
        assert_eq!(api_request.messages[0].role, "system");
        assert_eq!(api_request.max_tokens, Some(256));
        assert_eq!(
            api_request.response_format.unwrap().format_type,
            "json_object"
        );
    }

    // Wiremock-based tests for actual HTTP calls
    mod http_tests {
        use super::*;
        use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

        #[tokio::test]
        async fn test_complete_success() {
            let mock_server = MockServer::start().await;

            let response_body = serde_json::json!({
                "id": "chatcmpl-123",
                "model": "gpt-4o",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": "Hello back!"
                    },
                    "finish_reason": "stop"
                }],
                "usage": {
                    "prompt_tokens": 10,
                    "completion_tokens": 5,
                    "total_tokens": 15
                }
            })
            .to_string();

            Mock::given(matchers::method("POST"))
                .and(matchers::path("/"))
                .respond_with(ResponseTemplate::new(200).set_body_string(&response_body))
                .expect(1)
                .mount(&mock_server)
                .await;

            let model = OpenAiModel::with_url("test-key".to_string(), mock_server.uri());
            let result = model.complete(CompletionRequest::new("Hello")).await;
            assert_eq!(result.unwrap(), "Hello back!");
        }

        #[tokio::test]
        async fn test_complete_api_error() {
            let mock_server = MockServer::start().await;

            let error_body =
                r#"{"error": {"message": "Invalid API key", "type": "invalid_request_error"}}"#;

            Mock::given(matchers::method("POST"))
                .and(matchers::path("/"))
                .respond_with(ResponseTemplate::new(401).set_body_string(error_body))
                .expect(1)
                .mount(&mock_server)
                .await;

            let model = OpenAiModel::with_url("bad-key".to_string(), mock_server.uri());
            let result = model.complete(CompletionRequest::new("Hello")).await;
            match result.unwrap_err() {
                ModelError::Api { status, message } => {
                    assert_eq!(status, 401);
                    assert!(message.contains("Invalid API key"));
                }
                other => panic!("Expected Api error, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_complete_rate_limit() {
            let mock_server = MockServer::start().await;

            let error_body =
                r#"{"error": {"message": "Rate limit exceeded", "type": "rate_limit_error"}}"#;

            Mock::given(matchers::method("POST"))
                .and(matchers::path("/"))
                .respond_with(ResponseTemplate::new(429).set_body_string(error_body))
                .expect(1)
                .mount(&mock_server)
                .await;

            let model = OpenAiModel::with_url("test-key".to_string(), mock_server.uri());
            let result = model.complete(CompletionRequest::new("Hello")).await;
            match result.unwrap_err() {
                ModelError::Api { status, .. } => assert_eq!(status, 429),
                other => panic!("Expected Api error, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_complete_empty_choices() {
            let mock_server = MockServer::start().await;

            let response_body = serde_json::json!({
                "id": "chatcmpl-789",
                "model": "gpt-4o",
                "choices": [],
                "usage": null
            })
            .to_string();

            Mock::given(matchers::method("POST"))
                .and(matchers::path("/"))
                .respond_with(ResponseTemplate::new(200).set_body_string(&response_body))
                .expect(1)
                .mount(&mock_server)
                .await;

            let model = OpenAiModel::with_url("test-key".to_string(), mock_server.uri());
            let result = model.complete(CompletionRequest::new("Hello")).await;
            assert!(matches!(result, Err(ModelError::InvalidResponse(_))));
        }
    }
}
