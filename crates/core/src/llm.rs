use serde::{Deserialize, Serialize, Serializer};

use crate::error::ChatError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system<S: Into<String>>(s: S) -> Self {
        Self {
            role: Role::System,
            content: s.into(),
        }
    }
    pub fn user<S: Into<String>>(s: S) -> Self {
        Self {
            role: Role::User,
            content: s.into(),
        }
    }
    pub fn assistant<S: Into<String>>(s: S) -> Self {
        Self {
            role: Role::Assistant,
            content: s.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A function the model may call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolFunction,
}

impl Tool {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            kind: "function".to_string(),
            function: ToolFunction {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    /// Force a call to the named function.
    Function(String),
}

impl Serialize for ToolChoice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ToolChoice::Auto => serializer.serialize_str("auto"),
            ToolChoice::None => serializer.serialize_str("none"),
            ToolChoice::Required => serializer.serialize_str("required"),
            ToolChoice::Function(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name },
            })
            .serialize(serializer),
        }
    }
}

/// Caller-supplied identity used to fill template variables. Never sent as
/// conversation content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserContext {
    pub name: String,
    pub location: String,
}

/// Per-call overrides. Unset fields fall back to the client's defaults.
#[derive(Clone, Debug, Default)]
pub struct ChatOpts {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tools: Vec<Tool>,
    pub tool_choice: Option<ToolChoice>,
    pub user: Option<UserContext>,
    pub system_message: Option<String>,
}

impl ChatOpts {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }
    pub fn top_p(mut self, p: f32) -> Self {
        self.top_p = Some(p);
        self
    }
    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }
    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }
    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }
    pub fn user_context(mut self, name: &str, location: &str) -> Self {
        self.user = Some(UserContext {
            name: name.trim().to_string(),
            location: location.trim().to_string(),
        });
        self
    }
    pub fn system_message(mut self, content: impl Into<String>) -> Self {
        self.system_message = Some(content.into());
        self
    }
}

/// Fully resolved request for one logical exchange.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub stream: bool,
    pub tools: Vec<Tool>,
    pub tool_choice: Option<ToolChoice>,
    pub user: UserContext,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageStats {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// One decoded event of the completion stream.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct StreamChunk {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub delta_content: String,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub usage: Option<UsageStats>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ChoiceMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Choice {
    pub index: u32,
    pub message: ChoiceMessage,
    pub finish_reason: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ChatResponse {
    /// The remote session id the answer was streamed from.
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choice: Choice,
    pub usage: UsageStats,
}

impl ChatResponse {
    pub fn assistant(
        id: String,
        created: i64,
        model: String,
        content: String,
        usage: UsageStats,
    ) -> Self {
        Self {
            id,
            object: "chat.completion".to_string(),
            created,
            model,
            choice: Choice {
                index: 0,
                message: ChoiceMessage {
                    role: Role::Assistant,
                    content,
                },
                finish_reason: "stop".to_string(),
            },
            usage,
        }
    }

    pub fn content(&self) -> &str {
        &self.choice.message.content
    }
}

#[allow(async_fn_in_trait)]
pub trait ChatClient: Send + Sync {
    async fn chat(&self, msgs: Vec<Message>, opts: ChatOpts) -> Result<ChatResponse, ChatError>;

    async fn quick_chat(&self, prompt: &str, opts: ChatOpts) -> Result<String, ChatError> {
        let resp = self.chat(vec![Message::user(prompt)], opts).await?;
        Ok(resp.choice.message.content)
    }
}
