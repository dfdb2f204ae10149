use std::{fs, path::Path};

use anyhow::{Context, Result};
use tracing::warn;
use zchat_core::llm::Message;

/// Read a JSON-lines conversation. Blank lines are skipped, malformed ones
/// are logged and skipped.
pub fn load(path: &Path) -> Result<Vec<Message>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read history file: {}", path.display()))?;
    Ok(parse(&data))
}

fn parse(data: &str) -> Vec<Message> {
    let mut out = Vec::new();
    for (n, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(line) {
            Ok(m) => out.push(m),
            Err(e) => warn!(target: "zchat", "history line {}: {}", n + 1, e),
        }
    }
    out
}
