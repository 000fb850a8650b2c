//! Unified provider error handling.
//!
//! Translates each upstream provider's error shape into a single
//! OpenAI-compatible error response, so a client sees the same envelope
//! regardless of which adapter served the request.

use axum::{body::Body, response::Response};
use http::StatusCode;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible error types, mapped to the `type` field of the
/// response body. See <https://platform.openai.com/docs/guides/error-codes>.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiErrorType {
    InvalidRequest,
    Authentication,
    RateLimit,
    Server,
    Api,
}

impl OpenAiErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request_error",
            Self::Authentication => "authentication_error",
            Self::RateLimit => "rate_limit_error",
            Self::Server => "server_error",
            Self::Api => "api_error",
        }
    }
}

impl std::fmt::Display for OpenAiErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider error information extracted from a provider's error response.
#[derive(Debug, Clone)]
pub struct ProviderErrorInfo {
    pub error_type: OpenAiErrorType,
    pub message: String,
    pub code: String,
}

impl ProviderErrorInfo {
    pub fn new(error_type: OpenAiErrorType, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            code: code.into(),
        }
    }

    /// Map `status` to an [`OpenAiErrorType`] when a provider's body gives no
    /// better signal.
    fn from_status(status: StatusCode) -> OpenAiErrorType {
        match status.as_u16() {
            400 | 404 | 422 => OpenAiErrorType::InvalidRequest,
            401 | 403 => OpenAiErrorType::Authentication,
            429 => OpenAiErrorType::RateLimit,
            500..=599 => OpenAiErrorType::Server,
            _ => OpenAiErrorType::Api,
        }
    }
}

/// OpenAI-compatible error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiErrorResponse {
    pub error: OpenAiErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
}

/// Build an OpenAI-compatible error response from parsed provider error info.
pub fn build_provider_error_response(
    status: StatusCode,
    error_info: ProviderErrorInfo,
) -> Result<Response, super::ProviderError> {
    let response_body = OpenAiErrorResponse {
        error: OpenAiErrorBody {
            message: error_info.message,
            error_type: error_info.error_type.as_str().to_string(),
            code: error_info.code.to_lowercase(),
        },
    };

    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_string(&response_body).unwrap_or_default(),
        ))?)
}

/// Implemented once per upstream family to extract error information from
/// that family's wire format.
pub trait ProviderErrorParser {
    fn parse_error(status: StatusCode, headers: &http::HeaderMap, body: &[u8]) -> ProviderErrorInfo;
}

/// OpenAI's own error shape: `{"error": {"message", "type", "code"}}`. Azure
/// OpenAI deployments use the identical envelope, so this parser doubles as
/// [`AzureOpenAiErrorParser`]'s implementation.
pub struct OpenAiErrorParser;

impl ProviderErrorParser for OpenAiErrorParser {
    fn parse_error(status: StatusCode, _headers: &http::HeaderMap, body: &[u8]) -> ProviderErrorInfo {
        let parsed: serde_json::Value = serde_json::from_slice(body).unwrap_or_else(|_| serde_json::json!({}));
        let error_obj = &parsed["error"];
        let message = error_obj["message"].as_str().unwrap_or("Unknown provider error").to_string();
        let code = error_obj["code"].as_str().unwrap_or("unknown").to_string();

        let error_type = match error_obj["type"].as_str() {
            Some("invalid_request_error") => OpenAiErrorType::InvalidRequest,
            Some("authentication_error") => OpenAiErrorType::Authentication,
            Some("rate_limit_error") => OpenAiErrorType::RateLimit,
            Some("server_error") => OpenAiErrorType::Server,
            Some(_) => OpenAiErrorType::Api,
            None => ProviderErrorInfo::from_status(status),
        };

        ProviderErrorInfo::new(error_type, message, code)
    }
}

/// Azure OpenAI uses the same envelope as OpenAI-native.
pub type AzureOpenAiErrorParser = OpenAiErrorParser;

/// Unique has no first-party Rust SDK and its error body shape is not
/// standardized across deployments; this parser only trusts the HTTP status
/// and best-effort scrapes a `message` field if one is present.
pub struct UniqueErrorParser;

impl ProviderErrorParser for UniqueErrorParser {
    fn parse_error(status: StatusCode, _headers: &http::HeaderMap, body: &[u8]) -> ProviderErrorInfo {
        let parsed: serde_json::Value = serde_json::from_slice(body).unwrap_or_else(|_| serde_json::json!({}));
        let message = parsed["message"]
            .as_str()
            .or_else(|| parsed["error"].as_str())
            .unwrap_or("Unknown Unique error")
            .to_string();

        ProviderErrorInfo::new(ProviderErrorInfo::from_status(status), message, status.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_error_type_display() {
        assert_eq!(OpenAiErrorType::InvalidRequest.as_str(), "invalid_request_error");
        assert_eq!(OpenAiErrorType::RateLimit.as_str(), "rate_limit_error");
    }

    #[test]
    fn openai_parser_reads_explicit_type() {
        let body = br#"{"error": {"type": "rate_limit_error", "code": "429", "message": "slow down"}}"#;
        let info = OpenAiErrorParser::parse_error(StatusCode::TOO_MANY_REQUESTS, &http::HeaderMap::new(), body);
        assert_eq!(info.error_type, OpenAiErrorType::RateLimit);
        assert_eq!(info.message, "slow down");
    }

    #[test]
    fn openai_parser_infers_type_from_status_when_absent() {
        let body = br#"{"error": {"code": "InvalidModel", "message": "Model not found"}}"#;
        let info = AzureOpenAiErrorParser::parse_error(StatusCode::NOT_FOUND, &http::HeaderMap::new(), body);
        assert_eq!(info.error_type, OpenAiErrorType::InvalidRequest);
    }

    #[test]
    fn openai_parser_handles_malformed_body() {
        let info = OpenAiErrorParser::parse_error(StatusCode::INTERNAL_SERVER_ERROR, &http::HeaderMap::new(), b"not json");
        assert_eq!(info.error_type, OpenAiErrorType::Server);
        assert_eq!(info.message, "Unknown provider error");
    }

    #[test]
    fn unique_parser_falls_back_to_status() {
        let info = UniqueErrorParser::parse_error(StatusCode::UNAUTHORIZED, &http::HeaderMap::new(), b"");
        assert_eq!(info.error_type, OpenAiErrorType::Authentication);
    }

    #[test]
    fn unique_parser_reads_message_field() {
        let body = br#"{"message": "invalid app id"}"#;
        let info = UniqueErrorParser::parse_error(StatusCode::BAD_REQUEST, &http::HeaderMap::new(), body);
        assert_eq!(info.message, "invalid app id");
        assert_eq!(info.error_type, OpenAiErrorType::InvalidRequest);
    }

    #[test]
    fn build_provider_error_response_lowercases_code() {
        let info = ProviderErrorInfo::new(OpenAiErrorType::Api, "msg", "MixedCASE_Code");
        let response = build_provider_error_response(StatusCode::BAD_REQUEST, info).unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn build_provider_error_response_json_structure() {
        let info = ProviderErrorInfo::new(OpenAiErrorType::InvalidRequest, "Model not found", "ModelNotFound");
        let response = build_provider_error_response(StatusCode::NOT_FOUND, info).unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: OpenAiErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.error.message, "Model not found");
        assert_eq!(parsed.error.error_type, "invalid_request_error");
        assert_eq!(parsed.error.code, "modelnotfound");
    }
}
