use chatter::{ChunkedResponse, CreateChatCompletionRequest};

pub enum UserRequest {
    Prompt(String),
    Cancel,
}

pub enum ServerRequest {
    Start(CreateChatCompletionRequest),
    Cancel,
}

pub enum ServerResponse {
    Chunk(ChunkedResponse),
    Done,
    Cancelled,
    Error(String),
}
