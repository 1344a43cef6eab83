use std::time::Duration;

use async_trait::async_trait;
use deckgen_core::config::{LlmConfig, LlmProvider};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::llm::{ChatClient, ChatError, ChatRequest};

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("llm.api_key is required to build the chat client")]
    MissingApiKey,
    #[error("llm.endpoint is required to build the chat client")]
    MissingEndpoint,
    #[error("could not build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Chat-completions client for OpenAI-compatible endpoints.
///
/// Two flavors share one request shape: Azure routes through a deployment
/// path and authenticates with an `api-key` header; plain OpenAI uses the
/// `/v1/chat/completions` path with bearer auth and a `model` field.
pub struct OpenAiChatClient {
    http: Client,
    provider: LlmProvider,
    endpoint: String,
    deployment: String,
    api_version: String,
    api_key: SecretString,
}

impl OpenAiChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ClientBuildError> {
        let api_key = config.api_key.clone().ok_or(ClientBuildError::MissingApiKey)?;
        let endpoint = config
            .endpoint
            .clone()
            .ok_or(ClientBuildError::MissingEndpoint)?
            .trim_end_matches('/')
            .to_string();

        // One bounded wait per attempt; the retry budget lives a layer up.
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            provider: config.provider,
            endpoint,
            deployment: config.deployment.clone(),
            api_version: config.api_version.clone(),
            api_key,
        })
    }

    fn request_url(&self) -> String {
        match self.provider {
            LlmProvider::AzureOpenAi => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.endpoint, self.deployment, self.api_version
            ),
            LlmProvider::OpenAi => format!("{}/v1/chat/completions", self.endpoint),
        }
    }

    fn request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = json!({
            "messages": &request.messages,
            "max_completion_tokens": request.max_completion_tokens,
            "temperature": request.temperature,
        });
        if self.provider == LlmProvider::OpenAi {
            body["model"] = json!(self.deployment);
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionReply {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

fn classify_transport_error(error: reqwest::Error) -> ChatError {
    if error.is_timeout() {
        ChatError::Timeout
    } else {
        ChatError::Connect(error.to_string())
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError> {
        let mut http_request =
            self.http.post(self.request_url()).json(&self.request_body(request));

        http_request = match self.provider {
            LlmProvider::AzureOpenAi => {
                http_request.header("api-key", self.api_key.expose_secret())
            }
            LlmProvider::OpenAi => http_request.bearer_auth(self.api_key.expose_secret()),
        };

        let response = http_request.send().await.map_err(classify_transport_error)?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ChatError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChatError::Api { status: status.as_u16(), message });
        }

        let reply: ChatCompletionReply = response
            .json()
            .await
            .map_err(|error| ChatError::InvalidResponse(error.to_string()))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ChatError::InvalidResponse("reply contained no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use deckgen_core::config::{LlmConfig, LlmProvider, RetryConfig};

    use super::{ClientBuildError, OpenAiChatClient};

    fn config(provider: LlmProvider) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: Some("test-key".to_string().into()),
            endpoint: Some("https://example.openai.azure.com/".to_string()),
            deployment: "gpt-4o".to_string(),
            api_version: "2024-12-01-preview".to_string(),
            max_completion_tokens: 400,
            request_timeout_secs: 180,
            retry: RetryConfig { enabled: true, base_delay_secs: 1, budget_secs: 300 },
        }
    }

    #[test]
    fn azure_url_routes_through_deployment() {
        let client = OpenAiChatClient::from_config(&config(LlmProvider::AzureOpenAi))
            .expect("config is complete");
        assert_eq!(
            client.request_url(),
            "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-12-01-preview"
        );
    }

    #[test]
    fn openai_url_uses_v1_path_and_model_field() {
        let client =
            OpenAiChatClient::from_config(&config(LlmProvider::OpenAi)).expect("config is complete");
        assert_eq!(client.request_url(), "https://example.openai.azure.com/v1/chat/completions");

        let body = client.request_body(&crate::llm::ChatRequest::new(vec![]));
        assert_eq!(body["model"], "gpt-4o");
    }

    #[test]
    fn azure_body_omits_model_field() {
        let client = OpenAiChatClient::from_config(&config(LlmProvider::AzureOpenAi))
            .expect("config is complete");
        let body = client.request_body(&crate::llm::ChatRequest::new(vec![]));
        assert!(body.get("model").is_none());
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["max_completion_tokens"], 400);
    }

    #[test]
    fn missing_api_key_fails_to_build() {
        let mut incomplete = config(LlmProvider::OpenAi);
        incomplete.api_key = None;
        assert!(matches!(
            OpenAiChatClient::from_config(&incomplete),
            Err(ClientBuildError::MissingApiKey)
        ));
    }
}
