//! Adapter for Unique (<https://unique.ai>), which has no first-party Rust
//! SDK. Requests are authenticated by `x-app-id`/`x-company-id`/`x-user-id`
//! headers rather than a bearer token, mirroring Unique's own Python/Node
//! client libraries. Unique has no text-completion endpoint, so
//! [`UniqueAdapter::completion`] converts the request to a chat completion
//! and converts the response back, the same way Unique's own SDK does.

use async_trait::async_trait;
use axum::response::Response;
use http::header::CONTENT_TYPE;
use uuid::Uuid;

use crate::{
    config::providers::UniqueProviderConfig,
    models::{
        ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
        CompletionChoice, CompletionRequest, CompletionResponse, ModelsResponse, Usage,
    },
    net::client::{ClientFactory, ClientFactoryOptions},
    providers::{
        ProviderAdapter, ProviderError,
        error::{ProviderErrorParser, UniqueErrorParser},
        response,
        retry::{ProviderRequestError, RetryPolicy, default_llm_retry_policy, with_retry},
    },
};

/// Generates the `chatId`/`userMessageId`/`assistantMessageId` triple the
/// vendor requires on every streamed call.
fn generate_message_ids() -> serde_json::Value {
    serde_json::json!({
        "chatId": Uuid::new_v4().to_string(),
        "userMessageId": Uuid::new_v4().to_string(),
        "assistantMessageId": Uuid::new_v4().to_string(),
    })
}

/// The vendor never reports prompt-side token counts. When a response
/// carries no `usage` block, estimate `completion_tokens` as
/// `word_count(completion_text) * 1.3`, the same heuristic the vendor's own
/// Python client applies.
fn estimate_usage_if_missing(response: &mut ChatCompletionResponse) {
    if response.usage.is_some() {
        return;
    }
    let word_count: usize = response
        .choices
        .first()
        .and_then(|c| c.message.content.as_str())
        .map(|s| s.split_whitespace().count())
        .unwrap_or(0);
    let completion_tokens = (word_count as f64 * 1.3).round() as i64;
    response.usage = Some(Usage::new(0, completion_tokens));
}

pub struct UniqueAdapter {
    client: reqwest::Client,
    base_url: String,
    app_id: String,
    company_id: String,
    user_id: Option<String>,
    retry_policy: RetryPolicy,
}

impl UniqueAdapter {
    pub fn new(config: &UniqueProviderConfig) -> Result<Self, ProviderError> {
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
            app_id: config.app_id.clone(),
            company_id: config.company_id.clone(),
            user_id: config.user_id.clone(),
            retry_policy: default_llm_retry_policy(),
        })
    }

    fn identify(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder
            .header("x-app-id", &self.app_id)
            .header("x-company-id", &self.company_id);
        match &self.user_id {
            Some(user_id) => builder.header("x-user-id", user_id),
            None => builder,
        }
    }
}

async fn parse_error(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await.unwrap_or_default();
    let info = UniqueErrorParser::parse_error(status, &headers, &body);
    ProviderError::Internal(format!("{}: {}", info.code, info.message))
}

#[async_trait]
impl ProviderAdapter for UniqueAdapter {
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = request;
        request.stream = Some(false);
        let body = serde_json::to_vec(&request).unwrap_or_default();

        let http_response = with_retry(&self.retry_policy, "unique", "chat_completion", || async {
            self.identify(self.client.post(&url))
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
        let mut response: ChatCompletionResponse = http_response.json().await?;
        estimate_usage_if_missing(&mut response);
        Ok(response)
    }

    async fn stream_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = request;
        request.stream = Some(true);
        let mut payload = serde_json::to_value(&request).unwrap_or_default();
        if let Some(obj) = payload.as_object_mut()
            && let Some(ids) = generate_message_ids().as_object()
        {
            obj.extend(ids.clone());
        }
        let body = serde_json::to_vec(&payload).unwrap_or_default();

        let http_response = with_retry(&self.retry_policy, "unique", "stream_chat_completion", || async {
            self.identify(self.client.post(&url))
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone())
                .send()
                .await
                .map_err(ProviderRequestError::Request)
        })
        .await?;

        if !http_response.status().is_success() {
            return response::error_response::<UniqueErrorParser>(http_response).await;
        }
        response::streaming_response(http_response.status(), http_response.bytes_stream())
    }

    /// Unique has no text-completion endpoint: rebuild the prompt as a
    /// single user message, run it through chat completion, then flatten
    /// the chat response back into completion choices.
    async fn completion(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let prompt_text = match &request.prompt {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Array(parts) => parts
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        };

        let chat_request = ChatCompletionRequest {
            model: request.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: serde_json::Value::String(prompt_text),
                name: None,
            }],
            temperature: request.temperature,
            top_p: request.top_p,
            n: request.n,
            stream: Some(false),
            stop: request.stop.clone(),
            max_tokens: request.max_tokens,
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
            logit_bias: None,
            user: None,
            extra: Default::default(),
        };

        let chat_response = self.chat_completion(chat_request).await?;

        Ok(CompletionResponse {
            id: chat_response.id,
            object: "text_completion".to_string(),
            created: chat_response.created,
            model: chat_response.model,
            choices: chat_response
                .choices
                .into_iter()
                .map(|c: ChatCompletionChoice| CompletionChoice {
                    index: c.index,
                    text: c.message.content.as_str().unwrap_or_default().to_string(),
                    finish_reason: c.finish_reason,
                })
                .collect(),
            usage: chat_response.usage,
        })
    }

    async fn list_models(&self) -> Result<ModelsResponse, ProviderError> {
        let url = format!("{}/models", self.base_url);

        let http_response = with_retry(&self.retry_policy, "unique", "list_models", || async {
            self.identify(self.client.get(&url))
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_array_joins_with_newlines() {
        let request = CompletionRequest {
            model: "m".into(),
            prompt: serde_json::json!(["a", "b"]),
            max_tokens: None,
            temperature: None,
            top_p: None,
            n: None,
            stream: None,
            stop: None,
            presence_penalty: None,
            frequency_penalty: None,
            extra: Default::default(),
        };
        let text = match &request.prompt {
            serde_json::Value::Array(parts) => parts
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            _ => unreachable!(),
        };
        assert_eq!(text, "a\nb");
    }

    #[test]
    fn message_ids_are_unique_per_call() {
        let first = generate_message_ids();
        let second = generate_message_ids();
        assert_ne!(first["chatId"], second["chatId"]);
        assert_ne!(first["userMessageId"], first["assistantMessageId"]);
    }

    fn response_with_content(content: &str) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: "chatcmpl-1".into(),
            object: "chat.completion".into(),
            created: 0,
            model: "m".into(),
            choices: vec![ChatCompletionChoice {
                index: 0,
                message: ChatMessage {
                    role: "assistant".into(),
                    content: serde_json::Value::String(content.to_string()),
                    name: None,
                },
                finish_reason: Some("stop".into()),
            }],
            usage: None,
        }
    }

    #[test]
    fn usage_is_estimated_from_word_count_when_missing() {
        let mut response = response_with_content("one two three four");
        estimate_usage_if_missing(&mut response);
        let usage = response.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 0);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 5);
    }

    #[test]
    fn existing_usage_is_left_untouched() {
        let mut response = response_with_content("one two");
        response.usage = Some(Usage::new(10, 20));
        estimate_usage_if_missing(&mut response);
        let usage = response.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 20);
    }
}
