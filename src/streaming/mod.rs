//! Streaming response plumbing: an idle-timeout guard around the upstream
//! byte stream, and a usage-tracking wrapper that parses SSE chunks to
//! recover token counts and records a [`TokenUsage`] row when the stream
//! ends.

use std::{
    collections::VecDeque,
    io,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI64, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use futures_util::stream::Stream;
use serde_json::Value;
use tokio::time::Sleep;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::{db::DbPool, models::TokenUsage};

// ============================================================================
// Idle Timeout Stream
// ============================================================================

/// Error returned when a streaming response times out.
#[derive(Debug, thiserror::Error)]
#[error("streaming idle timeout: no chunk received within {0:?}")]
pub struct IdleTimeoutError(Duration);

/// Terminates a byte stream if no chunk arrives within `timeout` of the
/// previous one. Guards against stalled upstreams holding a connection open
/// indefinitely. A zero timeout disables the guard.
pub struct IdleTimeoutStream<S> {
    inner: S,
    timeout: Duration,
    sleep: Pin<Box<Sleep>>,
    terminated: bool,
}

impl<S> IdleTimeoutStream<S>
where
    S: Stream + Unpin,
{
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            sleep: Box::pin(tokio::time::sleep(timeout)),
            terminated: false,
        }
    }

    fn timeout_enabled(&self) -> bool {
        !self.timeout.is_zero()
    }
}

impl<S, T, E> Stream for IdleTimeoutStream<S>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    E: From<io::Error>,
{
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.terminated {
            return Poll::Ready(None);
        }

        if !self.timeout_enabled() {
            return Pin::new(&mut self.inner).poll_next(cx);
        }

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(item))) => {
                let new_deadline = tokio::time::Instant::now() + self.timeout;
                self.sleep.as_mut().reset(new_deadline);
                Poll::Ready(Some(Ok(item)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.terminated = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.terminated = true;
                Poll::Ready(None)
            }
            Poll::Pending => match self.sleep.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    self.terminated = true;
                    tracing::warn!(
                        timeout_secs = self.timeout.as_secs(),
                        "streaming response idle timeout, terminating stalled stream"
                    );
                    let err =
                        io::Error::new(io::ErrorKind::TimedOut, IdleTimeoutError(self.timeout));
                    Poll::Ready(Some(Err(err.into())))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

// ============================================================================
// SSE Parsing
// ============================================================================

/// Parses the Server-Sent Events framing used by chat/completion streaming
/// responses, recovering either an estimated delta token count or the
/// provider's final usage totals.
pub struct SseParser;

impl SseParser {
    pub fn parse_chunk(chunk: &[u8]) -> Option<SseChunk> {
        let chunk_str = std::str::from_utf8(chunk).ok()?;

        for line in chunk_str.lines() {
            let Some(json_str) = line.strip_prefix("data: ") else {
                continue;
            };

            if json_str.trim() == "[DONE]" {
                return Some(SseChunk::Done);
            }

            let Ok(json) = serde_json::from_str::<Value>(json_str) else {
                continue;
            };

            let usage = json
                .get("usage")
                .or_else(|| json.get("response").and_then(|r| r.get("usage")));

            if let Some(usage) = usage {
                let prompt_tokens = usage
                    .get("prompt_tokens")
                    .or_else(|| usage.get("input_tokens"))
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                let completion_tokens = usage
                    .get("completion_tokens")
                    .or_else(|| usage.get("output_tokens"))
                    .and_then(Value::as_i64)
                    .unwrap_or(0);

                let finish_reason = json
                    .get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("finish_reason"))
                    .and_then(Value::as_str)
                    .map(String::from)
                    .or_else(|| {
                        json.get("response")
                            .and_then(|r| r.get("status"))
                            .and_then(Value::as_str)
                            .map(|s| match s {
                                "completed" => "stop".to_string(),
                                other => other.to_string(),
                            })
                    });

                return Some(SseChunk::Usage {
                    prompt_tokens,
                    completion_tokens,
                    finish_reason,
                });
            }

            if let Some(content) = json
                .get("choices")
                .and_then(Value::as_array)
                .and_then(|arr| arr.first())
                .and_then(|choice| choice.get("delta"))
                .and_then(|delta| delta.get("content"))
                .and_then(Value::as_str)
            {
                // 1 token ~= 4 chars; a rough estimate used only until the
                // provider's final usage chunk supersedes it.
                let estimated_tokens = (content.len() as i64 + 3) / 4;
                return Some(SseChunk::Delta {
                    tokens: estimated_tokens,
                });
            }
        }

        None
    }
}

/// The synthetic chunk emitted in place of a severed connection when the
/// upstream stream fails mid-flight: `{"error":{"message","type":
/// "stream_error"}}`, framed exactly like a provider chunk, immediately
/// followed by the `[DONE]` sentinel.
fn stream_error_frame(message: &str) -> Bytes {
    let payload = serde_json::json!({
        "error": { "message": message, "type": "stream_error" }
    });
    Bytes::from(format!("data: {payload}\r\n\r\n"))
}

fn done_frame() -> Bytes {
    Bytes::from_static(b"data: [DONE]\r\n\r\n")
}

#[derive(Debug, Clone)]
pub enum SseChunk {
    Delta { tokens: i64 },
    Usage {
        prompt_tokens: i64,
        completion_tokens: i64,
        finish_reason: Option<String>,
    },
    Done,
}

/// Accumulates token counts across a stream. Atomic so updates from the
/// stream's poll context never need a lock.
#[derive(Debug, Default)]
pub struct TokenAccumulator {
    input_tokens: AtomicI64,
    output_tokens: AtomicI64,
    estimated_output: AtomicI64,
    usage_received: AtomicBool,
    finish_reason: std::sync::Mutex<Option<String>>,
}

impl TokenAccumulator {
    pub fn add_estimated_output(&self, count: i64) {
        self.estimated_output.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_usage(
        &self,
        prompt_tokens: i64,
        completion_tokens: i64,
        finish_reason: Option<String>,
    ) {
        self.input_tokens.store(prompt_tokens, Ordering::Relaxed);
        self.output_tokens
            .store(completion_tokens, Ordering::Relaxed);
        if finish_reason.is_some() {
            *self.finish_reason.lock().expect("accumulator mutex poisoned") = finish_reason;
        }
        // Released last so an Acquire load of `usage_received` observes the
        // other stores too.
        self.usage_received.store(true, Ordering::Release);
    }

    pub fn input_tokens(&self) -> i64 {
        self.input_tokens.load(Ordering::Relaxed)
    }

    pub fn output_tokens(&self) -> i64 {
        self.output_tokens.load(Ordering::Relaxed)
    }

    pub fn estimated_output(&self) -> i64 {
        self.estimated_output.load(Ordering::Relaxed)
    }

    pub fn usage_received(&self) -> bool {
        self.usage_received.load(Ordering::Acquire)
    }

    pub fn finish_reason(&self) -> Option<String> {
        self.finish_reason.lock().expect("accumulator mutex poisoned").clone()
    }
}

/// What a usage-tracking stream needs to know about the request it's
/// instrumenting, beyond the token counts it recovers from the stream itself.
#[derive(Debug, Clone)]
pub struct UsageContext {
    pub user_id: Uuid,
    pub model: String,
    pub request_id: Uuid,
    pub endpoint: String,
}

/// Records a [`TokenUsage`] row once a streaming response finishes, errors,
/// or is dropped. Kept separate from the stream wrapper itself so logging
/// can be spawned onto a [`TaskTracker`] without fighting stream lifetimes.
struct UsageLogger {
    db: Arc<DbPool>,
    context: UsageContext,
}

impl UsageLogger {
    /// Logs whatever usage was accumulated, falling back to the estimated
    /// output count if the provider never sent a final usage chunk.
    async fn log_usage(&self, tokens: &TokenAccumulator) {
        let (prompt_tokens, completion_tokens) = if tokens.usage_received() {
            (tokens.input_tokens(), tokens.output_tokens())
        } else {
            tracing::warn!("streaming usage logged without official token counts, using estimate");
            (0, tokens.estimated_output())
        };

        let usage = TokenUsage::new(
            self.context.user_id,
            self.context.model.clone(),
            prompt_tokens,
            completion_tokens,
            self.context.request_id,
            self.context.endpoint.clone(),
        );

        for attempt in 0..3u32 {
            match self.db.token_usage().record(usage.clone()).await {
                Ok(()) => {
                    tracing::debug!(
                        prompt_tokens, completion_tokens, "recorded streaming token usage"
                    );
                    return;
                }
                Err(e) if attempt == 2 => {
                    tracing::error!(error = %e, ?usage, "failed to record streaming token usage after 3 attempts");
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "failed to record streaming token usage, retrying");
                    tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
                }
            }
        }
    }
}

/// Wraps a streaming response body, parsing each SSE chunk for token counts
/// and recording a [`TokenUsage`] row when the stream reaches its natural
/// end. A mid-stream upstream failure (including an idle-timeout error from
/// an inner [`IdleTimeoutStream`]) is converted into the mandated synthetic
/// `stream_error` chunk followed by `[DONE]` rather than propagated as a raw
/// IO error that would sever the connection mid-frame.
///
/// A client disconnect or other cancellation drops this stream before it
/// reaches either terminal path; no [`TokenUsage`] row — partial or
/// estimated — is ever written for a cancelled call.
pub struct UsageTrackingStream<S> {
    inner: S,
    accumulated_tokens: Arc<TokenAccumulator>,
    usage_logger: Arc<UsageLogger>,
    stream_ended: bool,
    task_tracker: TaskTracker,
    pending_frames: Option<VecDeque<Bytes>>,
}

impl<S> UsageTrackingStream<S>
where
    S: Stream<Item = Result<Bytes, io::Error>> + Unpin,
{
    pub fn new(
        stream: S,
        db: Arc<DbPool>,
        context: UsageContext,
        task_tracker: TaskTracker,
    ) -> Self {
        Self {
            inner: stream,
            accumulated_tokens: Arc::new(TokenAccumulator::default()),
            usage_logger: Arc::new(UsageLogger { db, context }),
            stream_ended: false,
            task_tracker,
            pending_frames: None,
        }
    }

    /// Only reached on the stream's natural end (exhaustion or the synthetic
    /// error tail draining) — never from cancellation, which drops the
    /// stream without a poll reaching here.
    fn spawn_log(&mut self) {
        if self.stream_ended {
            return;
        }
        self.stream_ended = true;
        let logger = self.usage_logger.clone();
        let tokens = self.accumulated_tokens.clone();
        self.task_tracker.spawn(async move {
            logger.log_usage(&tokens).await;
        });
    }
}

impl<S> Stream for UsageTrackingStream<S>
where
    S: Stream<Item = Result<Bytes, io::Error>> + Unpin,
{
    type Item = Result<Bytes, io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.pending_frames.is_some() {
            let next = self.pending_frames.as_mut().and_then(VecDeque::pop_front);
            return match next {
                Some(frame) => Poll::Ready(Some(Ok(frame))),
                None => {
                    self.spawn_log();
                    Poll::Ready(None)
                }
            };
        }

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(sse_chunk) = SseParser::parse_chunk(&chunk) {
                    match sse_chunk {
                        SseChunk::Delta { tokens } => {
                            self.accumulated_tokens.add_estimated_output(tokens);
                        }
                        SseChunk::Usage {
                            prompt_tokens,
                            completion_tokens,
                            finish_reason,
                        } => {
                            self.accumulated_tokens.set_usage(
                                prompt_tokens,
                                completion_tokens,
                                finish_reason,
                            );
                        }
                        SseChunk::Done => {}
                    }
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                self.spawn_log();
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!(error = %e, "upstream stream failed mid-flight, emitting synthetic stream_error chunk");
                let mut frames = VecDeque::new();
                frames.push_back(stream_error_frame(&e.to_string()));
                frames.push_back(done_frame());
                let first = frames.pop_front();
                self.pending_frames = Some(frames);
                match first {
                    Some(frame) => Poll::Ready(Some(Ok(frame))),
                    None => {
                        self.spawn_log();
                        Poll::Ready(None)
                    }
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delta_chunk() {
        let chunk = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello world\"}}]}\n\n";
        match SseParser::parse_chunk(chunk) {
            Some(SseChunk::Delta { tokens }) => assert!((2..=4).contains(&tokens)),
            other => panic!("expected Delta chunk, got {other:?}"),
        }
    }

    #[test]
    fn parses_usage_chunk() {
        let chunk = b"data: {\"usage\":{\"prompt_tokens\":100,\"completion_tokens\":50}}\n\n";
        match SseParser::parse_chunk(chunk) {
            Some(SseChunk::Usage { prompt_tokens, completion_tokens, finish_reason }) => {
                assert_eq!(prompt_tokens, 100);
                assert_eq!(completion_tokens, 50);
                assert!(finish_reason.is_none());
            }
            other => panic!("expected Usage chunk, got {other:?}"),
        }
    }

    #[test]
    fn parses_responses_api_usage_format() {
        let chunk = br#"data: {"type":"response.completed","response":{"usage":{"input_tokens":187,"output_tokens":57},"status":"completed"}}"#;
        match SseParser::parse_chunk(chunk) {
            Some(SseChunk::Usage { prompt_tokens, completion_tokens, finish_reason }) => {
                assert_eq!(prompt_tokens, 187);
                assert_eq!(completion_tokens, 57);
                assert_eq!(finish_reason, Some("stop".to_string()));
            }
            other => panic!("expected Usage chunk, got {other:?}"),
        }
    }

    #[test]
    fn parses_finish_reason_from_choices() {
        let chunk = br#"data: {"choices":[{"finish_reason":"stop"}],"usage":{"prompt_tokens":100,"completion_tokens":50}}"#;
        match SseParser::parse_chunk(chunk) {
            Some(SseChunk::Usage { finish_reason, .. }) => {
                assert_eq!(finish_reason, Some("stop".to_string()));
            }
            other => panic!("expected Usage chunk, got {other:?}"),
        }
    }

    #[test]
    fn parses_done_marker() {
        assert!(matches!(
            SseParser::parse_chunk(b"data: [DONE]\n\n"),
            Some(SseChunk::Done)
        ));
    }

    #[test]
    fn ignores_invalid_or_empty_chunks() {
        assert!(SseParser::parse_chunk(b"invalid data").is_none());
        assert!(SseParser::parse_chunk(b"data: {\"choices\":[{\"delta\":{}}]}\n\n").is_none());
    }

    #[test]
    fn accumulator_starts_empty() {
        let acc = TokenAccumulator::default();
        assert_eq!(acc.input_tokens(), 0);
        assert_eq!(acc.output_tokens(), 0);
        assert_eq!(acc.estimated_output(), 0);
        assert!(!acc.usage_received());
        assert!(acc.finish_reason().is_none());
    }

    #[test]
    fn accumulator_records_usage() {
        let acc = TokenAccumulator::default();
        acc.add_estimated_output(5);
        assert_eq!(acc.estimated_output(), 5);
        acc.set_usage(10, 20, Some("stop".to_string()));
        assert!(acc.usage_received());
        assert_eq!(acc.input_tokens(), 10);
        assert_eq!(acc.output_tokens(), 20);
        assert_eq!(acc.finish_reason(), Some("stop".to_string()));
    }

    #[cfg(feature = "database-sqlite")]
    mod usage_tracking_stream {
        use futures_util::{StreamExt, stream};

        use super::*;
        use crate::config::{DatabaseConfig, SqliteConfig};

        async fn test_db_pool() -> (Arc<DbPool>, tempfile::TempDir) {
            let tempdir = tempfile::tempdir().expect("temp dir");
            let path = tempdir.path().join("usage-stream-test.sqlite3");
            let pool = DbPool::connect(&DatabaseConfig::Sqlite(SqliteConfig {
                path: path.to_string_lossy().to_string(),
                create_if_missing: true,
                run_migrations: true,
                wal_mode: false,
                busy_timeout_ms: 5_000,
                max_connections: 5,
            }))
            .await
            .expect("connect test db");
            (Arc::new(pool), tempdir)
        }

        fn context() -> UsageContext {
            UsageContext {
                user_id: Uuid::new_v4(),
                model: "openai_gpt-4".to_string(),
                request_id: Uuid::new_v4(),
                endpoint: "/v1/chat/completions".to_string(),
            }
        }

        /// A mid-stream upstream failure must surface to the client as the
        /// mandated synthetic `stream_error` chunk followed by `[DONE]`,
        /// never as a raw propagated IO error.
        #[tokio::test]
        async fn mid_stream_error_emits_synthetic_chunk_then_done() {
            let (db, _tempdir) = test_db_pool().await;
            let tracker = TaskTracker::new();

            let inner = stream::iter(vec![
                Ok::<Bytes, io::Error>(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n")),
                Err(io::Error::other("upstream connection reset")),
            ]);

            let tracked = UsageTrackingStream::new(inner, db, context(), tracker.clone());
            let chunks: Vec<_> = tracked.collect().await;

            assert_eq!(chunks.len(), 3, "pass-through chunk + synthetic error + [DONE]");
            assert!(chunks[0].as_ref().unwrap().windows(2).any(|w| w == b"hi"));

            let error_chunk = std::str::from_utf8(chunks[1].as_ref().unwrap()).unwrap();
            assert!(error_chunk.contains("\"type\":\"stream_error\""));
            assert!(error_chunk.contains("upstream connection reset"));
            assert!(error_chunk.starts_with("data: "));
            assert!(error_chunk.ends_with("\r\n\r\n"));

            let done_chunk = std::str::from_utf8(chunks[2].as_ref().unwrap()).unwrap();
            assert_eq!(done_chunk, "data: [DONE]\r\n\r\n");

            tracker.close();
            tracker.wait().await;
        }

        /// Dropping the stream before it reaches a terminal poll (client
        /// disconnect / cancellation) must never record a `TokenUsage` row,
        /// even a partial/estimated one.
        #[tokio::test]
        async fn dropped_before_completion_writes_no_usage_row() {
            let (db, _tempdir) = test_db_pool().await;
            let tracker = TaskTracker::new();
            let ctx = context();
            let user_id = ctx.user_id;

            let inner = stream::pending::<Result<Bytes, io::Error>>();
            let mut tracked = UsageTrackingStream::new(inner, db.clone(), ctx, tracker.clone());

            // The inner stream never produces an item; time out waiting on
            // it and drop the wrapper, simulating a client disconnect
            // mid-stream.
            let _ = tokio::time::timeout(Duration::from_millis(10), tracked.next()).await;
            drop(tracked);

            tracker.close();
            tracker.wait().await;

            let totals = db
                .token_usage()
                .sum_for_user(user_id, chrono::Utc::now() - chrono::Duration::days(1), chrono::Utc::now())
                .await
                .expect("sum_for_user");
            assert_eq!(totals.request_count, 0, "no usage row written on cancellation");
        }
    }
}
