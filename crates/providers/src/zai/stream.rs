use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::{header, StatusCode};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info};
use zchat_core::llm::{ChatRequest, StreamChunk, UsageStats};
use zchat_core::text::clean_response;
use zchat_core::{ChatError, Failure};

use super::client::{map_reqwest_err, ZaiClient};
use super::session::Session;
use super::supervisor::{self, LivenessWindows};
use super::{payload, template};

pub const EVENT_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, PartialEq)]
pub enum StreamEvent {
    Chunk(StreamChunk),
    Done,
}

#[derive(serde::Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    data: Option<StreamChunk>,
}

/// Decode one line of the body. `None` for anything that is not a usable
/// event: blank lines, other SSE fields, JSON that does not parse.
pub fn parse_event_line(line: &str) -> Option<StreamEvent> {
    let payload = line.trim().strip_prefix(EVENT_PREFIX)?.trim();
    if payload == DONE_SENTINEL {
        return Some(StreamEvent::Done);
    }
    // chunks arrive either wrapped as {"type":..,"data":{..}} or bare
    let chunk = match serde_json::from_str::<Envelope>(payload) {
        Ok(Envelope {
            kind,
            data: Some(mut chunk),
        }) => {
            if chunk.kind.is_none() {
                chunk.kind = kind;
            }
            chunk
        }
        _ => match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(target:"providers::zai","skipping unparseable event: {} payload={:?}", e, payload);
                return None;
            }
        },
    };
    Some(StreamEvent::Chunk(chunk))
}

/// Answer and usage accumulated by one read loop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Assembled {
    pub text: String,
    pub usage: UsageStats,
    pub saw_content: bool,
}

/// Consumes a completion body line by line. One instance per attempt.
pub struct StreamReader {
    started: Instant,
    first_content_window: Duration,
    first_content: Option<oneshot::Sender<()>>,
    saw_content: bool,
    answer: String,
    usage: UsageStats,
}

impl StreamReader {
    pub fn new(
        started: Instant,
        first_content_window: Duration,
        first_content: oneshot::Sender<()>,
    ) -> Self {
        Self {
            started,
            first_content_window,
            first_content: Some(first_content),
            saw_content: false,
            answer: String::new(),
            usage: UsageStats::default(),
        }
    }

    /// Returns true when the stream signalled its end.
    fn handle_line(&mut self, raw: &[u8]) -> bool {
        let line = String::from_utf8_lossy(raw);
        match parse_event_line(&line) {
            None => false,
            Some(StreamEvent::Done) => true,
            Some(StreamEvent::Chunk(chunk)) => {
                if !chunk.delta_content.is_empty() {
                    if let Some(tx) = self.first_content.take() {
                        info!(target:"providers::zai","first AI content chunk received after {:?}", self.started.elapsed());
                        let _ = tx.send(());
                    }
                    self.saw_content = true;
                    self.answer.push_str(&chunk.delta_content);
                }
                if let Some(usage) = chunk.usage {
                    self.usage = usage;
                }
                if chunk.done {
                    debug!(target:"providers::zai","AI response marked as done");
                }
                chunk.done
            }
        }
    }

    pub async fn run<S>(mut self, body: S) -> Result<Assembled, ChatError>
    where
        S: Stream<Item = Result<Bytes, Failure>>,
    {
        tokio::pin!(body);
        let mut buf = BytesMut::new();
        'read: loop {
            match body.next().await {
                Some(Ok(b)) => {
                    buf.extend_from_slice(&b);
                    while let Some(pos) = twoway::find_bytes(&buf, b"\n") {
                        let line = buf.split_to(pos + 1);
                        if self.handle_line(&line) {
                            break 'read;
                        }
                    }
                }
                Some(Err(e)) => return Err(ChatError::StreamRead(e)),
                None => {
                    if !buf.is_empty() {
                        let rest = buf.split();
                        self.handle_line(&rest);
                    }
                    break 'read;
                }
            }
        }
        self.finish()
    }

    fn finish(self) -> Result<Assembled, ChatError> {
        if !self.saw_content && self.started.elapsed() >= self.first_content_window {
            return Err(ChatError::NoContentTimeout(self.first_content_window));
        }
        Ok(Assembled {
            text: clean_response(&self.answer),
            usage: self.usage,
            saw_content: self.saw_content,
        })
    }
}

impl ZaiClient {
    /// Stream the completion for `req` inside `session`, supervised by the
    /// liveness windows. The first-content window also covers the wait for
    /// response headers.
    pub async fn stream_completion(
        &self,
        session: &Session,
        req: &ChatRequest,
    ) -> Result<Assembled, ChatError> {
        let cfg = self.config();
        let now = chrono::Utc::now().with_timezone(&cfg.timezone);
        let vars = template::variables(&now, &req.user, &self.locale());
        let request_id = uuid::Uuid::new_v4().to_string();
        let body = payload::completion(req, &session.id, &vars, &request_id);
        let windows = LivenessWindows {
            first_content: cfg.first_content_timeout,
            completion: cfg.completion_timeout,
        };

        let started = Instant::now();
        let send = self
            .http()
            .post(self.url("/chat/completions"))
            .header(header::ACCEPT, "*/*")
            .header("X-FE-Version", &cfg.frontend_version)
            .header(
                header::REFERER,
                format!("{}/c/{}", cfg.origin.trim_end_matches('/'), session.id),
            )
            .json(&body)
            .send();
        let resp = match tokio::time::timeout_at(started + windows.first_content, send).await {
            Ok(r) => r.map_err(|e| ChatError::StreamRead(map_reqwest_err(e)))?,
            Err(_) => return Err(ChatError::NoContentTimeout(windows.first_content)),
        };

        let status = resp.status();
        if status != StatusCode::OK {
            let body = self
                .error_body(resp)
                .await
                .map_err(ChatError::StreamRead)?;
            error!(target:"providers::zai","completion non-200 status={} body={:?}", status, body);
            return Err(ChatError::StreamRead(Failure::Status {
                status: status.as_u16(),
                body,
            }));
        }

        let body = resp.bytes_stream().map(|r| r.map_err(map_reqwest_err));
        supervisor::supervise(body, started, windows).await
    }
}
