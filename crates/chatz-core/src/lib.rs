//! Core library for chatz: an OpenAI-compatible chat client that streams
//! responses, renders them as HTML, and keeps conversation history.

pub mod config;
pub mod core;
mod fsutil;
pub mod history;
pub mod logging;
pub mod markdown;
pub mod providers;
