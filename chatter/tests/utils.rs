#![allow(dead_code)]

use chatter::{ChatCompletionRequestMessage, ClientConfig, CreateChatCompletionRequest};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const ROLE_LINE: &str = r#"data: {"id":"1","object":"x","created":1,"model":"m","choices":[{"delta":{"role":"assistant"}}]}"#;
pub const CONTENT_LINE: &str = r#"data: {"id":"1","object":"x","created":1,"model":"m","choices":[{"delta":{"content":"Hi"}}]}"#;
pub const DONE_LINE: &str = "data: [DONE]";

/// Server-sent event body with a blank separator after every line.
pub fn event_stream(lines: &[&str]) -> String {
    lines.iter().map(|line| format!("{line}\n\n")).collect()
}

pub fn content_line(content: &str) -> String {
    let chunk = json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "created": 1694268190,
        "model": "gpt-3.5-turbo",
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
    });
    format!("data: {chunk}")
}

pub fn request() -> CreateChatCompletionRequest {
    CreateChatCompletionRequest::builder()
        .model("gpt-3.5-turbo")
        .messages(vec![ChatCompletionRequestMessage::user("Hello!")])
        .build()
}

pub fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(format!("{}/v1/", server.uri()))
}

pub async fn mount_stream(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(server)
        .await;
}
