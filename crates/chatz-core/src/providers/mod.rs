//! OpenAI-compatible endpoint access: request client, model discovery and
//! the streaming delta assembler.

pub mod chat_completions;
pub mod models;
pub mod shared;
pub mod sse;

pub use chat_completions::{ChatCompletionsClient, ChatCompletionsConfig};
pub use models::fetch_available_models;
pub use shared::{ProviderError, ProviderErrorKind, ProviderResult};
pub use sse::{DeltaEventStream, DeltaStream, StreamEnd, StreamEvent};
