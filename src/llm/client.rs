//! @ai:module:intent Anthropic Messages API client used by classification jobs
//! @ai:module:layer infrastructure
//! @ai:module:public_api LlmClient, AnthropicClient, MockLlmClient, LlmResponse, ClientError
//! @ai:module:stateless false

use crate::config::ApiConfig;
use crate::executor::ExecutorError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use thiserror::Error;

/// Rate-limit kind reported for HTTP 429 responses
pub const TOO_MANY_REQUESTS: &str = "too_many_requests";

/// @ai:intent Failure talking to the model provider
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Rate limited by provider ({status}): {body}")]
    RateLimited { status: u16, body: String },

    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to send request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Missing API key: environment variable {0} is not set")]
    MissingApiKey(String),
}

impl From<ClientError> for ExecutorError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::RateLimited { .. } => {
                ExecutorError::rate_limited(TOO_MANY_REQUESTS, err.to_string())
            }
            other => ExecutorError::failed(other.to_string()),
        }
    }
}

/// @ai:intent Trait for model completion clients
pub trait LlmClient: Send + Sync {
    /// @ai:intent Send a single-turn prompt and return the model's text
    fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> impl Future<Output = Result<LlmResponse, ClientError>> + Send;
}

/// @ai:intent Response from the model provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub stop_reason: String,
}

/// @ai:intent Messages API request body
#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

/// @ai:intent Messages API response body
#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

/// @ai:intent HTTP client for the Anthropic Messages API
///            Throttling is left to the RateLimiter wrapped around the generation function
pub struct AnthropicClient {
    client: reqwest::Client,
    config: ApiConfig,
    api_key: String,
}

impl AnthropicClient {
    /// @ai:intent Create a client reading the key from the configured environment variable
    /// @ai:pre config.api_key_env is set in the environment
    /// @ai:effects env
    pub fn new(config: ApiConfig) -> Result<Self, ClientError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| ClientError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_api_key(config, api_key)
    }

    /// @ai:intent Create a client with an explicit key
    /// @ai:effects pure
    pub fn with_api_key(config: ApiConfig, api_key: String) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }
}

impl LlmClient for AnthropicClient {
    /// @ai:intent Send a message and map HTTP 429 to a rate-limit error
    /// @ai:effects network
    async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<LlmResponse, ClientError> {
        let request = ApiRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::RateLimited {
                status: status.as_u16(),
                body,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let api_response: ApiResponse = response.json().await?;

        let content = api_response
            .content
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("\n");

        Ok(LlmResponse {
            content,
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
            stop_reason: api_response.stop_reason.unwrap_or_default(),
        })
    }
}

/// @ai:intent Scripted client for tests and dry runs
///            Plays queued outcomes first, then repeats the default response
pub struct MockLlmClient {
    default_response: String,
    script: Mutex<VecDeque<Result<String, u16>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    /// @ai:intent Create a mock client that returns a fixed response
    /// @ai:effects pure
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// @ai:intent Queue a one-off response
    /// @ai:effects state:write
    pub fn then_respond(self, response: impl Into<String>) -> Self {
        self.script.lock().push_back(Ok(response.into()));
        self
    }

    /// @ai:intent Queue a one-off HTTP error status (429 becomes a rate-limit error)
    /// @ai:effects state:write
    pub fn then_fail(self, status: u16) -> Self {
        self.script.lock().push_back(Err(status));
        self
    }

    /// @ai:intent Prompts received so far, in call order
    /// @ai:effects pure
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl LlmClient for MockLlmClient {
    /// @ai:intent Return the next scripted outcome
    /// @ai:effects state:write
    async fn complete(&self, prompt: &str, _system: Option<&str>) -> Result<LlmResponse, ClientError> {
        self.prompts.lock().push(prompt.to_string());
        let next = self.script.lock().pop_front();

        let content = match next {
            Some(Ok(content)) => content,
            Some(Err(429)) => {
                return Err(ClientError::RateLimited {
                    status: 429,
                    body: "mock rate limit".to_string(),
                })
            }
            Some(Err(status)) => {
                return Err(ClientError::Api {
                    status,
                    body: "mock failure".to_string(),
                })
            }
            None => self.default_response.clone(),
        };

        Ok(LlmResponse {
            content,
            input_tokens: 100,
            output_tokens: 20,
            stop_reason: "end_turn".to_string(),
        })
    }
}
