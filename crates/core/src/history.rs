use crate::llm::{Message, Role};

/// Marker appended to a clipped first message.
pub const CLIP_MARKER: &str = "…";

/// Bound the history to at most `max` messages.
///
/// The first system message, if any, is kept verbatim at the front; the rest
/// of the budget goes to the most recent non-leading messages in their
/// original order.
pub fn trim_messages(messages: Vec<Message>, max: usize) -> Vec<Message> {
    if messages.len() <= max {
        return messages;
    }
    let mut system: Option<Message> = None;
    let mut rest = Vec::with_capacity(messages.len());
    for m in messages {
        if system.is_none() && m.role == Role::System {
            system = Some(m);
            continue;
        }
        rest.push(m);
    }
    let limit = if system.is_some() {
        max.saturating_sub(1)
    } else {
        max
    };
    if rest.len() > limit {
        rest.drain(..rest.len() - limit);
    }
    // max == 0 leaves no room even for the system message
    let mut out: Vec<Message> = system.into_iter().take(max).collect();
    out.extend(rest);
    out
}

/// Trim whitespace and cap at `max_chars` characters, marking the cut.
pub fn clip_user_input(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &trimmed[..cut], CLIP_MARKER),
        None => trimmed.to_string(),
    }
}
