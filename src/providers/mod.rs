//! Upstream LLM provider adapters.
//!
//! Each adapter translates the gateway's internal chat/completion types into
//! one upstream vendor's wire format and back. All three share the retry
//! loop in [`retry`] and the response helpers in [`response`]. An adapter
//! owns its own `reqwest::Client`, built once at startup from that
//! provider's own proxy/TLS settings.

pub mod error;
pub(crate) mod open_ai;
pub(crate) mod azure_openai;
pub(crate) mod unique;
pub mod response;
pub mod retry;

use async_trait::async_trait;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

use crate::{
    config::providers::ProviderConfig,
    models::{
        ChatCompletionRequest, ChatCompletionResponse, CompletionRequest, CompletionResponse,
        ModelsResponse,
    },
};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to build response: {0}")]
    ResponseBuilder(#[from] http::Error),

    #[error("Internal provider error: {0}")]
    Internal(String),
}

impl IntoResponse for ProviderError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProviderError::Request(_) => StatusCode::BAD_GATEWAY,
            ProviderError::ResponseBuilder(_) | ProviderError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

impl From<retry::ProviderRequestError> for ProviderError {
    fn from(err: retry::ProviderRequestError) -> Self {
        match err {
            retry::ProviderRequestError::Request(e) => ProviderError::Request(e),
        }
    }
}

/// A single configured upstream account, able to serve chat/completion
/// traffic and report which models it exposes.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ProviderError>;

    async fn stream_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<Response, ProviderError>;

    async fn completion(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    async fn list_models(&self) -> Result<ModelsResponse, ProviderError>;
}

/// Build the concrete adapter for one entry of [`ProviderConfig`], including
/// its dedicated `reqwest::Client`.
pub fn build_adapter(config: &ProviderConfig) -> Result<Box<dyn ProviderAdapter>, ProviderError> {
    Ok(match config {
        ProviderConfig::OpenAi(c) => Box::new(open_ai::OpenAiAdapter::new(c)?),
        ProviderConfig::AzureOpenai(c) => Box::new(azure_openai::AzureOpenAiAdapter::new(c)?),
        ProviderConfig::Unique(c) => Box::new(unique::UniqueAdapter::new(c)?),
    })
}
