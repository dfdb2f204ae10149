//! Wire shapes for the two provider calls. Everything here is incidental
//! provider detail kept out of the domain types.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use zchat_core::llm::ChatRequest;

fn hidden_mcp_servers() -> Value {
    json!([
        {"type": "mcp", "server": "vibe-coding", "status": "hidden"},
        {"type": "mcp", "server": "ppt-maker", "status": "hidden"},
        {"type": "mcp", "server": "image-search", "status": "hidden"},
    ])
}

/// Body of `POST /v1/chats/new`: a conversation seeded with one user turn.
pub fn new_chat(
    title: &str,
    model: &str,
    first_message: &str,
    message_id: &str,
    timestamp: i64,
) -> Value {
    let message = json!({
        "id": message_id,
        "parentId": null,
        "childrenIds": [],
        "role": "user",
        "content": first_message,
        "timestamp": timestamp,
        "models": [model],
    });
    let mut history = serde_json::Map::new();
    history.insert(message_id.to_string(), message.clone());
    json!({
        "chat": {
            "id": "",
            "title": title,
            "models": [model],
            "params": {},
            "history": {
                "messages": history,
                "currentId": message_id,
            },
            "messages": [message],
            "tags": [],
            "flags": [],
            "features": hidden_mcp_servers(),
            "enable_thinking": false,
            "timestamp": timestamp * 1000,
        }
    })
}

/// Body of `POST /chat/completions` for an existing session.
pub fn completion(
    req: &ChatRequest,
    session_id: &str,
    variables: &BTreeMap<String, String>,
    request_id: &str,
) -> Value {
    let mut body = json!({
        "stream": req.stream,
        "model": req.model,
        "messages": req.messages,
        "params": {
            "temperature": req.temperature,
            "top_p": req.top_p,
            "max_tokens": req.max_tokens,
        },
        "tool_servers": [],
        "features": {
            "image_generation": false,
            "code_interpreter": false,
            "web_search": false,
            "auto_web_search": false,
            "preview_mode": true,
            "flags": [],
            "features": hidden_mcp_servers(),
            "enable_thinking": false,
        },
        "variables": variables,
        "chat_id": session_id,
        "id": request_id,
    });
    if let Some(map) = body.as_object_mut() {
        if !req.tools.is_empty() {
            map.insert("tools".to_string(), json!(req.tools));
        }
        if let Some(choice) = &req.tool_choice {
            map.insert("tool_choice".to_string(), json!(choice));
        }
    }
    body
}
