use std::error::Error as _;
use std::io;

use reqwest::{header, Client};
use tracing::{debug, info};
use zchat_core::history::{clip_user_input, trim_messages};
use zchat_core::llm::{ChatClient, ChatOpts, ChatRequest, ChatResponse, Message, Role};
use zchat_core::{ChatError, Failure};

use super::config::ZaiConfig;
use super::retry::{Backoff, RetryPolicy};
use super::template::Locale;

const FALLBACK_FIRST_MESSAGE: &str = "hello";

#[derive(Clone)]
pub struct ZaiClient {
    http: Client,
    cfg: ZaiConfig,
    retry: RetryPolicy,
}

impl ZaiClient {
    pub fn new(cfg: ZaiConfig) -> Result<Self, ChatError> {
        cfg.validate()?;
        let header_value = |v: &str, name: &str| {
            header::HeaderValue::from_str(v)
                .map_err(|e| ChatError::Config(format!("invalid {name} header: {e}")))
        };
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header_value(&format!("Bearer {}", cfg.auth_token), "authorization")?,
        );
        headers.insert(header::USER_AGENT, header_value(&cfg.user_agent, "user-agent")?);
        headers.insert(header::ORIGIN, header_value(&cfg.origin, "origin")?);

        // no overall timeout: streams are bounded by the liveness windows and
        // the session call by its own request timeout
        let mut builder = Client::builder()
            .default_headers(headers)
            .use_rustls_tls()
            .connect_timeout(cfg.connect_timeout)
            .pool_idle_timeout(std::time::Duration::from_secs(30))
            .pool_max_idle_per_host(2);
        if let Some(p) = &cfg.proxy {
            let proxy = reqwest::Proxy::all(p)
                .map_err(|e| ChatError::Config(format!("proxy {p:?}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| ChatError::Config(format!("http client: {e}")))?;
        let retry = RetryPolicy {
            max_retries: cfg.max_retries,
            backoff: Backoff {
                base: cfg.retry_delay,
                ceiling: cfg.max_retry_delay,
            },
            jitter: cfg.retry_jitter,
        };
        Ok(Self { http, cfg, retry })
    }

    pub fn from_env() -> Result<Self, ChatError> {
        Self::new(ZaiConfig::from_env_and_file()?)
    }

    pub fn config(&self) -> &ZaiConfig {
        &self.cfg
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    pub(crate) fn locale(&self) -> Locale {
        Locale {
            timezone_label: self.cfg.timezone.name().to_string(),
            default_location: self.cfg.default_location.clone(),
            language: self.cfg.language.clone(),
        }
    }

    /// Resolve per-call options against the configured defaults.
    pub fn build_request(&self, mut msgs: Vec<Message>, opts: ChatOpts) -> ChatRequest {
        if let Some(system) = opts.system_message {
            msgs.insert(0, Message::system(system));
        }
        ChatRequest {
            model: opts
                .model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.cfg.model.clone()),
            messages: trim_messages(msgs, self.cfg.max_history),
            temperature: opts.temperature.unwrap_or(self.cfg.temperature),
            max_tokens: opts.max_tokens.unwrap_or(self.cfg.max_tokens),
            top_p: opts.top_p.unwrap_or(self.cfg.top_p),
            stream: true,
            tools: opts.tools,
            tool_choice: opts.tool_choice,
            user: opts.user.unwrap_or_default(),
        }
    }

    /// Read the body of a failed response, bounded by `session_timeout`.
    pub(crate) async fn error_body(&self, resp: reqwest::Response) -> Result<String, Failure> {
        match tokio::time::timeout(self.cfg.session_timeout, resp.text()).await {
            Ok(text) => Ok(text.unwrap_or_default()),
            Err(_) => Err(Failure::Timeout(format!(
                "error body not received within {:?}",
                self.cfg.session_timeout
            ))),
        }
    }

    fn first_user_message(&self, req: &ChatRequest) -> String {
        req.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| clip_user_input(&m.content, self.cfg.max_input_chars))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| FALLBACK_FIRST_MESSAGE.to_string())
    }
}

impl ChatClient for ZaiClient {
    async fn chat(&self, msgs: Vec<Message>, opts: ChatOpts) -> Result<ChatResponse, ChatError> {
        if msgs.is_empty() {
            return Err(ChatError::NoMessages);
        }
        let req = self.build_request(msgs, opts);
        let first = self.first_user_message(&req);
        info!(target:"providers::zai","start chat model={} messages={}", req.model, req.messages.len());

        let req = &req;
        let first = first.as_str();
        self.retry
            .run(|attempt| async move {
                debug!(target:"providers::zai","attempt {} opening session", attempt + 1);
                // a fresh session per attempt; a failed attempt's id is never reused
                let session = self.open_session(first).await?;
                let answer = self.stream_completion(&session, req).await?;
                Ok::<_, ChatError>(ChatResponse::assistant(
                    session.id,
                    chrono::Utc::now().timestamp(),
                    req.model.clone(),
                    answer.text,
                    answer.usage,
                ))
            })
            .await
    }
}

/// Classify a transport error, looking through its source chain for the
/// underlying I/O condition.
pub(crate) fn map_reqwest_err(e: reqwest::Error) -> Failure {
    if e.is_timeout() {
        return Failure::Timeout(e.to_string());
    }
    if e.is_connect() || e.is_request() {
        return Failure::Connect(e.to_string());
    }
    let mut source = e.source();
    while let Some(inner) = source {
        if let Some(io_err) = inner.downcast_ref::<io::Error>() {
            return match io_err.kind() {
                io::ErrorKind::UnexpectedEof => Failure::Eof,
                io::ErrorKind::TimedOut => Failure::Timeout(e.to_string()),
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe => Failure::Connect(e.to_string()),
                _ => Failure::Io(e.to_string()),
            };
        }
        source = inner.source();
    }
    if e.is_body() || e.is_decode() {
        Failure::Io(e.to_string())
    } else {
        Failure::Transport(e.to_string())
    }
}
