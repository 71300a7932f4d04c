mod client;
mod message;

pub use client::{
    Completion, CompletionClient, CompletionError, HttpCompletionClient, REQUEST_TIMEOUT,
};
pub use message::ChatMessage;
