//! Response building helpers shared by all provider adapters.

use axum::{body::Body, response::Response};
use bytes::Bytes;
use futures_util::Stream;
use http::StatusCode;
use serde::Serialize;

use super::{
    ProviderError,
    error::{ProviderErrorParser, build_provider_error_response},
};

/// Build a JSON response with the standard `application/json` content type.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response, ProviderError> {
    let json = serde_json::to_string(body).unwrap_or_default();

    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(json))
        .map_err(ProviderError::ResponseBuilder)
}

/// Build a Server-Sent Events streaming response.
///
/// `X-Accel-Buffering: no` tells an nginx-style reverse proxy in front of the
/// gateway not to buffer the stream, which would otherwise defeat SSE.
pub fn streaming_response<S, E>(status: StatusCode, stream: S) -> Result<Response, ProviderError>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    Response::builder()
        .status(status)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("connection", "keep-alive")
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(stream))
        .map_err(ProviderError::ResponseBuilder)
}

/// Build an error response from a failed upstream HTTP response, using `P`
/// to parse that provider's error shape.
pub async fn error_response<P: ProviderErrorParser>(
    response: reqwest::Response,
) -> Result<Response, ProviderError> {
    let status = response.status();
    let headers = response.headers().clone();
    let body_bytes = response.bytes().await.unwrap_or_default();

    let error_info = P::parse_error(status, &headers, &body_bytes);
    build_provider_error_response(status, error_info)
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use futures_util::stream;
    use serde_json::json;

    use super::*;

    #[test]
    fn json_response_sets_content_type() {
        let body = json!({"id": "test", "choices": []});
        let response = json_response(StatusCode::OK, &body).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("content-type").unwrap(), "application/json");
    }

    #[tokio::test]
    async fn streaming_response_sets_sse_headers() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from("data: {\"test\":1}\n\n")),
            Ok(Bytes::from("data: [DONE]\n\n")),
        ];
        let stream = stream::iter(chunks);

        let response = streaming_response(StatusCode::OK, stream).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("content-type").unwrap(), "text/event-stream");
        assert_eq!(response.headers().get("cache-control").unwrap(), "no-cache");
        assert_eq!(response.headers().get("connection").unwrap(), "keep-alive");
        assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");

        let body_bytes = to_bytes(response.into_body(), 1024).await.unwrap();
        let body_str = String::from_utf8_lossy(&body_bytes);
        assert!(body_str.contains("data: {\"test\":1}"));
        assert!(body_str.contains("data: [DONE]"));
    }

    #[test]
    fn json_response_with_error_status() {
        let body = json!({"error": {"message": "Bad request"}});
        let response = json_response(StatusCode::BAD_REQUEST, &body).unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
