mod args;
mod history;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use providers::zai::ZaiClient;
use tokio::io::AsyncReadExt;
use tracing::info;
use zchat_core::llm::{ChatClient, Message};

use args::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = logging::init(args.log_dir.as_deref())?;

    let prompt = match &args.prompt {
        Some(p) => p.clone(),
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("read prompt from stdin")?;
            buf
        }
    };
    if prompt.trim().is_empty() {
        anyhow::bail!("empty prompt");
    }

    let mut msgs = match &args.history {
        Some(path) => history::load(path)?,
        None => Vec::new(),
    };
    msgs.push(Message::user(prompt.trim()));

    let client = ZaiClient::from_env().context("create client")?;
    info!(target: "zchat", "sending {} messages", msgs.len());
    // the terminal error is printed once, by anyhow on return from main
    let resp = client.chat(msgs, args.chat_opts()).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
    } else {
        println!("{}", resp.content());
    }
    Ok(())
}
