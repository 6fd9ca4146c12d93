pub mod chat;
pub mod checkpoint;
pub mod command;
pub mod config;
pub mod llm;
pub mod loader;
pub mod process;
pub mod prompt;
pub mod retry;
