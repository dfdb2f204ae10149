pub mod error;
pub mod history;
pub mod llm;
pub mod text;

pub use error::{ChatError, Failure};
