use std::path::PathBuf;

use clap::Parser;
use zchat_core::llm::ChatOpts;

/// Ask the remote assistant a question and print the answer.
#[derive(Debug, Parser)]
#[command(name = "zchat", version)]
pub struct Args {
    /// Prompt text; read from stdin when omitted
    pub prompt: Option<String>,
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub temperature: Option<f32>,
    #[arg(long)]
    pub max_tokens: Option<u32>,
    #[arg(long)]
    pub top_p: Option<f32>,
    /// System message prepended to the conversation
    #[arg(long)]
    pub system: Option<String>,
    #[arg(long)]
    pub user_name: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    /// JSON-lines file of earlier messages
    #[arg(long)]
    pub history: Option<PathBuf>,
    /// Print the full response as JSON
    #[arg(long)]
    pub json: bool,
    /// Also write logs to a daily-rotated file in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl Args {
    pub fn chat_opts(&self) -> ChatOpts {
        let mut opts = ChatOpts::default();
        if let Some(m) = &self.model {
            opts = opts.model(m.clone());
        }
        if let Some(t) = self.temperature {
            opts = opts.temperature(t);
        }
        if let Some(n) = self.max_tokens {
            opts = opts.max_tokens(n);
        }
        if let Some(p) = self.top_p {
            opts = opts.top_p(p);
        }
        if let Some(s) = &self.system {
            opts = opts.system_message(s.clone());
        }
        if self.user_name.is_some() || self.location.is_some() {
            opts = opts.user_context(
                self.user_name.as_deref().unwrap_or_default(),
                self.location.as_deref().unwrap_or_default(),
            );
        }
        opts
    }
}
