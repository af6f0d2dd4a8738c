//! Model invocation over an OpenAI-compatible chat completions API.
//!
//! The core only depends on the `ModelInvoker` trait; the HTTP client here
//! is the production implementation, configured from the environment. A
//! missing key or base URL is a fatal startup error, while per-call failures
//! are caught at the `call` stage and recorded as normal trial errors.

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors from the model-invocation collaborator
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Missing {0} in environment")]
    MissingEnv(&'static str),

    #[error("Model call failed: {0}")]
    RequestFailed(String),

    #[error("Model API returned status {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Model returned no completion content")]
    EmptyCompletion,
}

/// One model under evaluation: a display name plus the provider's model id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    /// Name used for grouping and output directories
    pub name: String,
    /// Identifier passed to the API
    pub model: String,
}

impl std::str::FromStr for ModelEntry {
    type Err = std::convert::Infallible;

    /// Parse `name=model-id`, or a bare id used as both name and id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.split_once('=') {
            Some((name, model)) => Self {
                name: name.trim().to_string(),
                model: model.trim().to_string(),
            },
            None => Self {
                name: s.trim().to_string(),
                model: s.trim().to_string(),
            },
        })
    }
}

/// The model-invocation collaborator: text in, text out
pub trait ModelInvoker {
    /// Obtain a completion for `prompt` from the model identified by
    /// `model_id`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, an API error status, or an
    /// empty completion.
    fn invoke(&self, model_id: &str, prompt: &str) -> Result<String, ClientError>;
}

const SYSTEM_PROMPT: &str = "You are a precise code generator.";

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Blocking HTTP client against an OpenAI-compatible endpoint
pub struct HttpModelClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl HttpModelClient {
    /// Build a client from `OPENAI_API_KEY` and `OPENAI_BASE_URL`.
    ///
    /// # Errors
    ///
    /// Returns `MissingEnv` when either variable is unset; callers treat
    /// this as fatal at startup.
    pub fn from_env() -> Result<Self, ClientError> {
        let api_key =
            std::env::var("OPENAI_API_KEY").map_err(|_| ClientError::MissingEnv("OPENAI_API_KEY"))?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .map_err(|_| ClientError::MissingEnv("OPENAI_BASE_URL"))?;
        Ok(Self::new(&base_url, &api_key))
    }

    /// Build a client for an explicit endpoint
    #[must_use]
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

impl ModelInvoker for HttpModelClient {
    fn invoke(&self, model_id: &str, prompt: &str) -> Result<String, ClientError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = json!({
            "model": model_id,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0,
        });

        tracing::debug!(model = model_id, url = %url, "invoking model");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .map_err(|e| ClientError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClientError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = response
            .json()
            .map_err(|e| ClientError::RequestFailed(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ClientError::EmptyCompletion);
        }
        Ok(content)
    }
}
