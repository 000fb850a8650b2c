//! Azure OpenAI provider.
//!
//! Authenticates as a service principal via the OAuth2 client-credentials
//! flow against Azure AD (see [`token`]). Chat/completion calls address a
//! deployment directly by name — Azure OpenAI deployment names are
//! conventionally the underlying model name, so `request.model` is used
//! verbatim as the deployment id. Model listing prefers the Azure Resource
//! Manager deployments API when a subscription/resource group/resource name
//! are configured, and otherwise falls back to the Azure OpenAI
//! `/openai/models` endpoint.

mod token;

use async_trait::async_trait;
use axum::response::Response;
use http::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Map, Value};
use token::AzureTokenSource;

use crate::{
    config::providers::AzureProviderConfig,
    models::{
        ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
        CompletionChoice, CompletionRequest, CompletionResponse, ModelInfo, ModelsResponse,
    },
    net::client::{ClientFactory, ClientFactoryOptions},
    providers::{
        ProviderAdapter, ProviderError,
        error::{AzureOpenAiErrorParser, ProviderErrorParser},
        response,
        retry::{ProviderRequestError, RetryPolicy, default_llm_retry_policy, with_retry},
    },
};

/// Deployment name substrings for chat-family models that Azure OpenAI never
/// exposes on the legacy `/completions` endpoint. Deployment names are
/// operator-chosen but conventionally embed the underlying model name.
const CHAT_ONLY_MODEL_MARKERS: &[&str] = &["gpt-4", "gpt-3.5-turbo", "gpt-35-turbo", "claude", "mistral"];

fn is_chat_only_deployment(model: &str) -> bool {
    let lower = model.to_lowercase();
    if lower.ends_with("-instruct") {
        return false;
    }
    CHAT_ONLY_MODEL_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Azure-unsupported fields stripped from a `/completions` payload before
/// forwarding. `model` is stripped from every Azure payload
/// since the deployment is already named in the URL path.
const COMPLETION_ONLY_UNSUPPORTED_FIELDS: &[&str] = &["best_of", "suffix", "echo", "logit_bias"];

const MAX_STOP_SEQUENCES: usize = 4;
const DEFAULT_MAX_TOKENS: i64 = 1000;

fn clamp_f64(value: f64, lo: f64, hi: f64) -> f64 {
    value.clamp(lo, hi)
}

/// Apply Azure's request payload adjustments: drop `model` (already
/// in the URL) and, for completions, the fields Azure doesn't accept;
/// coerce an array `prompt` to a newline-joined string; clamp numeric
/// ranges; truncate `stop` to 4 sequences; default `max_tokens` to 1000.
fn adjust_azure_payload(value: &mut Value, is_completion: bool) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };

    obj.remove("model");

    if is_completion {
        for field in COMPLETION_ONLY_UNSUPPORTED_FIELDS {
            obj.remove(*field);
        }
        coerce_prompt_to_string(obj);
    }

    clamp_numeric_field(obj, "temperature", 0.0, 2.0);
    clamp_numeric_field(obj, "top_p", 0.0, 1.0);
    clamp_integer_field(obj, "n", 1, 128);
    clamp_numeric_field(obj, "presence_penalty", -2.0, 2.0);
    clamp_numeric_field(obj, "frequency_penalty", -2.0, 2.0);
    truncate_stop_sequences(obj);

    if !obj.contains_key("max_tokens") || obj.get("max_tokens").is_some_and(Value::is_null) {
        obj.insert("max_tokens".to_string(), Value::from(DEFAULT_MAX_TOKENS));
    }
}

fn coerce_prompt_to_string(obj: &mut Map<String, Value>) {
    if let Some(Value::Array(parts)) = obj.get("prompt") {
        let joined = parts
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        obj.insert("prompt".to_string(), Value::String(joined));
    }
}

fn clamp_numeric_field(obj: &mut Map<String, Value>, key: &str, lo: f64, hi: f64) {
    if let Some(n) = obj.get(key).and_then(Value::as_f64) {
        obj.insert(key.to_string(), Value::from(clamp_f64(n, lo, hi)));
    }
}

fn clamp_integer_field(obj: &mut Map<String, Value>, key: &str, lo: i64, hi: i64) {
    if let Some(n) = obj.get(key).and_then(Value::as_i64) {
        obj.insert(key.to_string(), Value::from(n.clamp(lo, hi)));
    }
}

fn truncate_stop_sequences(obj: &mut Map<String, Value>) {
    if let Some(Value::Array(stop)) = obj.get("stop")
        && stop.len() > MAX_STOP_SEQUENCES
    {
        let truncated: Vec<Value> = stop.iter().take(MAX_STOP_SEQUENCES).cloned().collect();
        obj.insert("stop".to_string(), Value::Array(truncated));
    }
}

pub struct AzureOpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
    token_source: AzureTokenSource,
    api_key: Option<String>,
    subscription_id: Option<String>,
    resource_group: Option<String>,
    resource_name: Option<String>,
    retry_policy: RetryPolicy,
}

impl AzureOpenAiAdapter {
    pub fn new(config: &AzureProviderConfig) -> Result<Self, ProviderError> {
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
            api_version: config.api_version.clone(),
            token_source: AzureTokenSource::new(
                config.tenant_id.clone(),
                config.client_id.clone(),
                config.client_secret.clone(),
            ),
            api_key: config.api_key.clone(),
            subscription_id: config.subscription_id.clone(),
            resource_group: config.resource_group.clone(),
            resource_name: config.resource_name.clone(),
            retry_policy: default_llm_retry_policy(),
        })
    }

    async fn auth_header(&self) -> Result<(&'static str, String), ProviderError> {
        if let Some(key) = &self.api_key {
            return Ok(("api-key", key.clone()));
        }
        let bearer = self
            .token_source
            .get_bearer_header(&self.client)
            .await
            .map_err(ProviderError::Internal)?;
        Ok(("Authorization", bearer.to_string()))
    }

    fn deployment_url(&self, deployment: &str, operation: &str) -> String {
        format!(
            "{}/openai/deployments/{}/{}?api-version={}",
            self.base_url, deployment, operation, self.api_version
        )
    }

    async fn completion_via_chat(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
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

    /// Prefer listing configured deployments via Azure Resource Manager;
    /// fall back to the Azure OpenAI `/openai/models` endpoint when the
    /// resource coordinates aren't configured.
    async fn list_via_resource_manager(&self) -> Option<Result<ModelsResponse, ProviderError>> {
        let (sub, rg, resource) = (
            self.subscription_id.as_ref()?,
            self.resource_group.as_ref()?,
            self.resource_name.as_ref()?,
        );

        Some(self.list_deployments(sub, rg, resource).await)
    }

    async fn list_deployments(
        &self,
        subscription_id: &str,
        resource_group: &str,
        resource_name: &str,
    ) -> Result<ModelsResponse, ProviderError> {
        #[derive(Debug, Deserialize)]
        struct DeploymentListResponse {
            value: Vec<Deployment>,
        }

        #[derive(Debug, Deserialize)]
        struct Deployment {
            name: String,
        }

        // Deployment listing always requires the ARM management scope, not
        // the Cognitive Services scope used for inference calls.
        let bearer = self
            .token_source
            .get_management_bearer_header(&self.client)
            .await
            .map_err(ProviderError::Internal)?;

        let url = format!(
            "https://management.azure.com/subscriptions/{subscription_id}/resourceGroups/{resource_group}\
             /providers/Microsoft.CognitiveServices/accounts/{resource_name}/deployments?api-version=2024-10-01"
        );

        let http_response = with_retry(&self.retry_policy, "azure_openai", "list_deployments", || async {
            self.client
                .get(&url)
                .header("Authorization", bearer.to_string())
                .send()
                .await
                .map_err(ProviderRequestError::Request)
        })
        .await?;

        if !http_response.status().is_success() {
            return Err(parse_error(http_response).await);
        }

        let parsed: DeploymentListResponse = http_response.json().await?;
        Ok(ModelsResponse {
            object: "list".to_string(),
            data: parsed
                .value
                .into_iter()
                .map(|d| ModelInfo {
                    id: d.name,
                    object: "model".to_string(),
                    created: 0,
                    owned_by: "azure".to_string(),
                })
                .collect(),
        })
    }
}

async fn parse_error(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await.unwrap_or_default();
    let info = AzureOpenAiErrorParser::parse_error(status, &headers, &body);
    ProviderError::Internal(format!("{}: {}", info.code, info.message))
}

#[async_trait]
impl ProviderAdapter for AzureOpenAiAdapter {
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let (header_name, header_value) = self.auth_header().await?;
        let url = self.deployment_url(&request.model, "chat/completions");
        let mut request = request;
        request.stream = Some(false);
        let mut payload = serde_json::to_value(&request).unwrap_or_default();
        adjust_azure_payload(&mut payload, false);
        let body = serde_json::to_vec(&payload).unwrap_or_default();

        let http_response = with_retry(&self.retry_policy, "azure_openai", "chat_completion", || async {
            self.client
                .post(&url)
                .header(header_name, header_value.clone())
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
        let (header_name, header_value) = self.auth_header().await?;
        let url = self.deployment_url(&request.model, "chat/completions");
        let mut request = request;
        request.stream = Some(true);
        let mut payload = serde_json::to_value(&request).unwrap_or_default();
        adjust_azure_payload(&mut payload, false);
        let body = serde_json::to_vec(&payload).unwrap_or_default();

        let http_response = with_retry(&self.retry_policy, "azure_openai", "stream_chat_completion", || async {
            self.client
                .post(&url)
                .header(header_name, header_value.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone())
                .send()
                .await
                .map_err(ProviderRequestError::Request)
        })
        .await?;

        if !http_response.status().is_success() {
            return response::error_response::<AzureOpenAiErrorParser>(http_response).await;
        }
        response::streaming_response(http_response.status(), http_response.bytes_stream())
    }

    /// Deployments for chat-family models (gpt-4, gpt-35-turbo, and similar)
    /// reject the legacy `/completions` endpoint outright, so those are
    /// downgraded to a chat completion with the prompt folded into a single
    /// user message, then flattened back into completion choices — the same
    /// pattern the Unique adapter uses for its own completions-less API.
    async fn completion(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        if is_chat_only_deployment(&request.model) {
            return self.completion_via_chat(request).await;
        }

        let (header_name, header_value) = self.auth_header().await?;
        let url = self.deployment_url(&request.model, "completions");
        let mut request = request;
        request.stream = Some(false);
        let mut payload = serde_json::to_value(&request).unwrap_or_default();
        adjust_azure_payload(&mut payload, true);
        let body = serde_json::to_vec(&payload).unwrap_or_default();

        let http_response = with_retry(&self.retry_policy, "azure_openai", "completion", || async {
            self.client
                .post(&url)
                .header(header_name, header_value.clone())
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

    async fn list_models(&self) -> Result<ModelsResponse, ProviderError> {
        if let Some(result) = self.list_via_resource_manager().await {
            return result;
        }

        let (header_name, header_value) = self.auth_header().await?;
        let url = format!("{}/openai/models?api-version={}", self.base_url, self.api_version);

        let http_response = with_retry(&self.retry_policy, "azure_openai", "list_models", || async {
            self.client
                .get(&url)
                .header(header_name, header_value.clone())
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
    fn chat_only_markers_are_case_insensitive() {
        assert!(is_chat_only_deployment("GPT-4-Turbo"));
        assert!(is_chat_only_deployment("my-gpt-35-turbo-deployment"));
        assert!(is_chat_only_deployment("claude-3-opus"));
    }

    #[test]
    fn legacy_completion_models_are_not_downgraded() {
        assert!(!is_chat_only_deployment("text-davinci-003"));
        assert!(!is_chat_only_deployment("gpt-35-turbo-instruct"));
    }

    #[test]
    fn prompt_array_coerced_to_newline_joined_string() {
        let mut payload = serde_json::json!({"model": "x", "prompt": ["a", "b"]});
        adjust_azure_payload(&mut payload, true);
        assert_eq!(payload["prompt"], serde_json::json!("a\nb"));
    }

    #[test]
    fn stop_sequences_truncated_to_four() {
        let mut payload = serde_json::json!({"model": "x", "prompt": "hi", "stop": ["a", "b", "c", "d", "e"]});
        adjust_azure_payload(&mut payload, true);
        assert_eq!(payload["stop"], serde_json::json!(["a", "b", "c", "d"]));
    }

    #[test]
    fn unsupported_completion_fields_are_stripped() {
        let mut payload = serde_json::json!({
            "model": "x", "prompt": "hi", "best_of": 3, "suffix": "!", "echo": true, "logit_bias": {"50256": -100}
        });
        adjust_azure_payload(&mut payload, true);
        let obj = payload.as_object().unwrap();
        assert!(!obj.contains_key("best_of"));
        assert!(!obj.contains_key("suffix"));
        assert!(!obj.contains_key("echo"));
        assert!(!obj.contains_key("logit_bias"));
        assert!(!obj.contains_key("model"));
    }

    #[test]
    fn ranges_are_clamped() {
        let mut payload = serde_json::json!({
            "model": "x", "prompt": "hi", "temperature": 5.0, "top_p": 2.0, "n": 500,
            "presence_penalty": -10.0, "frequency_penalty": 10.0
        });
        adjust_azure_payload(&mut payload, true);
        assert_eq!(payload["temperature"], serde_json::json!(2.0));
        assert_eq!(payload["top_p"], serde_json::json!(1.0));
        assert_eq!(payload["n"], serde_json::json!(128));
        assert_eq!(payload["presence_penalty"], serde_json::json!(-2.0));
        assert_eq!(payload["frequency_penalty"], serde_json::json!(2.0));
    }

    #[test]
    fn max_tokens_defaults_to_1000_when_absent() {
        let mut payload = serde_json::json!({"model": "x", "prompt": "hi"});
        adjust_azure_payload(&mut payload, true);
        assert_eq!(payload["max_tokens"], serde_json::json!(1000));
    }

    #[test]
    fn max_tokens_left_untouched_when_present() {
        let mut payload = serde_json::json!({"model": "x", "prompt": "hi", "max_tokens": 42});
        adjust_azure_payload(&mut payload, true);
        assert_eq!(payload["max_tokens"], serde_json::json!(42));
    }
}
