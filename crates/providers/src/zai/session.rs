use std::time::SystemTime;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, error};
use zchat_core::history::clip_user_input;
use zchat_core::{ChatError, Failure};

use super::client::{map_reqwest_err, ZaiClient};
use super::payload;

/// A provider-side conversation. Owned by exactly one attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub created_at: SystemTime,
}

#[derive(Deserialize)]
struct NewChatResponse {
    #[serde(default)]
    id: String,
}

impl ZaiClient {
    /// Create a new remote conversation seeded with `first_message`.
    pub async fn open_session(&self, first_message: &str) -> Result<Session, ChatError> {
        let cfg = self.config();
        let first_message = clip_user_input(first_message, cfg.max_input_chars);
        let message_id = uuid::Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().timestamp();
        let body = payload::new_chat(
            &cfg.chat_title,
            &cfg.model,
            &first_message,
            &message_id,
            timestamp,
        );

        let resp = self
            .http()
            .post(self.url("/v1/chats/new"))
            .timeout(cfg.session_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::SessionCreate(map_reqwest_err(e)))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = self
                .error_body(resp)
                .await
                .map_err(ChatError::SessionCreate)?;
            error!(target:"providers::zai","create chat non-200 status={} body={:?}", status, body);
            return Err(ChatError::SessionCreate(Failure::Status {
                status: status.as_u16(),
                body,
            }));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ChatError::SessionCreate(map_reqwest_err(e)))?;
        let parsed: NewChatResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ChatError::SessionCreate(Failure::Decode(e.to_string())))?;
        if parsed.id.trim().is_empty() {
            return Err(ChatError::SessionCreate(Failure::EmptySessionId));
        }
        debug!(target:"providers::zai","chat session created id={}", parsed.id);
        Ok(Session {
            id: parsed.id,
            created_at: SystemTime::now(),
        })
    }
}
