//! Typed client for OpenAI-compliant chat completions, with a streaming
//! decoder for the `data: `-framed chunk protocol.

pub mod blocking;
pub mod client;
pub mod decoder;
pub mod error;
pub mod framer;
pub mod models;
pub mod transport;
mod utils;

pub use blocking::{BlockingChunkStream, BlockingClient};
pub use client::{ChunkStream, Client, collect_content};
pub use error::{ConfigError, DecodeError, Error, Result, TransportError};
pub use models::{
    chat::{
        ApiError, ApiErrorResponse, ChatCompletionRequestMessage, ChatCompletionResponseMessage,
        ChunkedResponse, CreateChatCompletionRequest, CreateChatCompletionResponse, DeltaChoice,
        DeltaContent, StreamedReply, StreamingRequest, Usage,
    },
    config::ClientConfig,
    role::{ChatMessageRole, WireEnum},
};
pub use tokio_util::sync::CancellationToken;
