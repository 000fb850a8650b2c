//! End-to-end tests against a real loopback socket: a seeded SQLite
//! database, a [`wiremock`] stand-in for the upstream provider, and plain
//! [`reqwest`] calls through the full router.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

use super::support::{TestApp, bearer};

fn chat_completion_body(model: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hello there."},
            "finish_reason": "stop",
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15},
    })
}

#[tokio::test]
async fn happy_chat_completion_is_served_and_usage_recorded() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body("gpt-4")))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = TestApp::spawn(&upstream.uri()).await;
    let group = app.create_group("engineering").await;
    let user = app.create_user("alice", vec![group.name.clone()]).await;
    let api_key = app.issue_api_key(user.id).await;
    let model = app.create_approved_model("gpt-4", "https://api.openai.com/v1").await;
    app.authorize_group(model.id, group.id).await;

    let base_url = app.spawn_http().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base_url}/v1/chat/completions"))
        .header("authorization", bearer(&api_key))
        .json(&json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello there.");

    let totals = app
        .state
        .db
        .as_ref()
        .unwrap()
        .token_usage()
        .sum_for_user(user.id, Utc::now() - ChronoDuration::days(1), Utc::now())
        .await
        .expect("sum_for_user");
    assert_eq!(totals.request_count, 1);
    assert_eq!(totals.prompt_tokens, 10);
    assert_eq!(totals.completion_tokens, 5);
}

#[tokio::test]
async fn user_outside_authorized_group_is_forbidden() {
    let upstream = MockServer::start().await;
    // No mock mounted for chat/completions: a 403 must be returned before
    // the request ever reaches the upstream.

    let app = TestApp::spawn(&upstream.uri()).await;
    let allowed_group = app.create_group("engineering").await;
    let other_group = app.create_group("sales").await;
    let user = app.create_user("bob", vec![other_group.name.clone()]).await;
    let api_key = app.issue_api_key(user.id).await;
    let model = app.create_approved_model("gpt-4", "https://api.openai.com/v1").await;
    app.authorize_group(model.id, allowed_group.id).await;

    let base_url = app.spawn_http().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base_url}/v1/chat/completions"))
        .header("authorization", bearer(&api_key))
        .json(&json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn streaming_chat_completion_forwards_sse_and_records_usage() {
    let upstream = MockServer::start().await;
    let sse_body = concat!(
        "data: {\"id\":\"chatcmpl-1\",\"object\":\"chat.completion.chunk\",\"created\":1,",
        "\"model\":\"gpt-4\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hi\"},",
        "\"finish_reason\":null}]}\n\n",
        "data: {\"id\":\"chatcmpl-1\",\"object\":\"chat.completion.chunk\",\"created\":1,",
        "\"model\":\"gpt-4\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}],",
        "\"usage\":{\"prompt_tokens\":8,\"completion_tokens\":2,\"total_tokens\":10}}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body, "text/event-stream")
                .insert_header("cache-control", "no-cache"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let app = TestApp::spawn(&upstream.uri()).await;
    let group = app.create_group("engineering").await;
    let user = app.create_user("carol", vec![group.name.clone()]).await;
    let api_key = app.issue_api_key(user.id).await;
    let model = app.create_approved_model("gpt-4", "https://api.openai.com/v1").await;
    app.authorize_group(model.id, group.id).await;

    let base_url = app.spawn_http().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base_url}/v1/chat/completions"))
        .header("authorization", bearer(&api_key))
        .json(&json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true,
        }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    let body = response.text().await.expect("body text");
    assert!(body.contains("\"content\":\"Hi\""));
    assert!(body.trim_end().ends_with("data: [DONE]"));

    app.drain_background_tasks().await;
    let totals = app
        .state
        .db
        .as_ref()
        .unwrap()
        .token_usage()
        .sum_for_user(user.id, Utc::now() - ChronoDuration::days(1), Utc::now())
        .await
        .expect("sum_for_user");
    assert_eq!(totals.request_count, 1);
    assert_eq!(totals.prompt_tokens, 8);
    assert_eq!(totals.completion_tokens, 2);
}

#[tokio::test]
async fn transient_upstream_failure_is_retried_to_success() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body("gpt-4")))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = TestApp::spawn(&upstream.uri()).await;
    let group = app.create_group("engineering").await;
    let user = app.create_user("dave", vec![group.name.clone()]).await;
    let api_key = app.issue_api_key(user.id).await;
    let model = app.create_approved_model("gpt-4", "https://api.openai.com/v1").await;
    app.authorize_group(model.id, group.id).await;

    let base_url = app.spawn_http().await;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("client");
    let response = client
        .post(format!("{base_url}/v1/chat/completions"))
        .header("authorization", bearer(&api_key))
        .json(&json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200, "retry must recover from the transient 503");
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello there.");
}
