//! Adapter for providers that speak the OpenAI wire format natively
//! (OpenAI itself and any OpenAI-compatible gateway reachable at a
//! configurable `base_url`).

use async_trait::async_trait;
use axum::response::Response;
use http::header::{AUTHORIZATION, CONTENT_TYPE};

use crate::{
    config::providers::OpenAiProviderConfig,
    models::{ChatCompletionRequest, ChatCompletionResponse, CompletionRequest, CompletionResponse, ModelsResponse},
    net::client::{ClientFactory, ClientFactoryOptions},
    providers::{
        ProviderAdapter, ProviderError,
        error::{OpenAiErrorParser, ProviderErrorParser},
        response,
        retry::{ProviderRequestError, RetryPolicy, default_llm_retry_policy, with_retry},
    },
};

async fn parse_error(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await.unwrap_or_default();
    let info = OpenAiErrorParser::parse_error(status, &headers, &body);
    ProviderError::Internal(format!("{}: {}", info.code, info.message))
}

pub struct OpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    retry_policy: RetryPolicy,
}

impl OpenAiAdapter {
    pub fn new(config: &OpenAiProviderConfig) -> Result<Self, ProviderError> {
        let client = ClientFactory::build(
            &config.base_url,
            &config.http,
            &ClientFactoryOptions {
                proxy_url: config.proxy_url.clone(),
                tls: config.tls.load().map_err(|e| ProviderError::Internal(e.to_string()))?,
            },
        )?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry_policy: default_llm_retry_policy(),
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header(AUTHORIZATION, format!("Bearer {}", self.api_key))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(parse_error(response).await)
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = request;
        request.stream = Some(false);
        let body = serde_json::to_vec(&request).unwrap_or_default();

        let http_response = with_retry(&self.retry_policy, "open_ai", "chat_completion", || async {
            self.authed(self.client.post(&url))
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone())
                .send()
                .await
                .map_err(ProviderRequestError::Request)
        })
        .await?;

        if !http_response.status().is_success() {
            return Err(parse_error(http_response).await);
        }

        Ok(http_response.json().await?)
    }

    async fn stream_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = request;
        request.stream = Some(true);
        let body = serde_json::to_vec(&request).unwrap_or_default();

        let http_response = with_retry(&self.retry_policy, "open_ai", "stream_chat_completion", || async {
            self.authed(self.client.post(&url))
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone())
                .send()
                .await
                .map_err(ProviderRequestError::Request)
        })
        .await?;

        if !http_response.status().is_success() {
            return response::error_response::<OpenAiErrorParser>(http_response).await;
        }

        response::streaming_response(
            http_response.status(),
            http_response.bytes_stream(),
        )
    }

    async fn completion(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let url = format!("{}/completions", self.base_url);
        let mut request = request;
        request.stream = Some(false);
        let body = serde_json::to_vec(&request).unwrap_or_default();

        let http_response = with_retry(&self.retry_policy, "open_ai", "completion", || async {
            self.authed(self.client.post(&url))
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone())
                .send()
                .await
                .map_err(ProviderRequestError::Request)
        })
        .await?;

        let http_response = Self::check_status(http_response).await?;
        Ok(http_response.json().await?)
    }

    async fn list_models(&self) -> Result<ModelsResponse, ProviderError> {
        let url = format!("{}/models", self.base_url);

        let http_response = with_retry(&self.retry_policy, "open_ai", "list_models", || async {
            self.authed(self.client.get(&url)).send().await.map_err(ProviderRequestError::Request)
        })
        .await?;

        let http_response = Self::check_status(http_response).await?;
        Ok(http_response.json().await?)
    }
}
