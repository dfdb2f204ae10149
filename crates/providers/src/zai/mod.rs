pub mod client;
pub mod config;
pub mod payload;
pub mod retry;
pub mod session;
pub mod stream;
pub mod supervisor;
pub mod template;

pub use client::ZaiClient;
pub use config::ZaiConfig;
