use bon::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{models::role::ChatMessageRole, utils};

/// Request records that can be switched into streaming mode.
pub trait StreamingRequest: Serialize {
    fn set_stream(&mut self, stream: bool);
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChatCompletionRequestMessage {
    pub role: ChatMessageRole,
    pub content: String,
}

impl ChatCompletionRequestMessage {
    pub fn new(role: ChatMessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatMessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatMessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatMessageRole::Assistant, content)
    }
}

impl From<ChatCompletionResponseMessage> for ChatCompletionRequestMessage {
    fn from(message: ChatCompletionResponseMessage) -> Self {
        Self {
            role: message.role,
            content: message.content,
        }
    }
}

impl fmt::Display for ChatCompletionRequestMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.content)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChatCompletionResponseMessage {
    pub role: ChatMessageRole,
    #[serde(default)]
    pub content: String,
}

#[derive(Builder, Clone, Debug, PartialEq, Serialize)]
pub struct CreateChatCompletionRequest {
    #[builder(into)]
    pub model: String,
    pub messages: Vec<ChatCompletionRequestMessage>,
    #[builder(default)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl StreamingRequest for CreateChatCompletionRequest {
    fn set_stream(&mut self, stream: bool) {
        self.stream = stream;
    }
}

/// Incremental role and text carried by one chunk.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct DeltaContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ChatMessageRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct DeltaChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<DeltaContent>,
    // Only set on non-streaming responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatCompletionResponseMessage>,
}

impl DeltaChoice {
    pub fn role(&self) -> Option<ChatMessageRole> {
        self.delta.as_ref().and_then(|delta| delta.role)
    }

    pub fn content(&self) -> Option<&str> {
        self.delta
            .as_ref()
            .and_then(|delta| delta.content.as_deref())
    }
}

impl fmt::Display for DeltaChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (role, content) = match &self.message {
            Some(message) => (message.role.to_string(), message.content.as_str()),
            None => (String::new(), ""),
        };
        match self.index {
            Some(index) => write!(f, "Choice {} - {role}: {content}", index + 1),
            None => write!(f, "{role}: {content}"),
        }
    }
}

/// One decoded `data:` line of a chat completion stream.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChunkedResponse {
    #[serde(deserialize_with = "utils::deserialize_non_empty")]
    pub id: String,
    #[serde(deserialize_with = "utils::deserialize_non_empty")]
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<DeltaChoice>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    pub total_tokens: u32,
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.completion_tokens {
            Some(completion) => write!(
                f,
                "Total: {} (Prompt: {}, Completion: {completion})",
                self.total_tokens, self.prompt_tokens
            ),
            None => write!(
                f,
                "Total: {} (Prompt: {})",
                self.total_tokens, self.prompt_tokens
            ),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CreateChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<DeltaChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The error object the API sends when it aborts a stream.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ApiError {
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Assistant reply assembled from the chunks of one streaming call.
///
/// Only the first choice (index 0, or unindexed) is tracked.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamedReply {
    pub role: Option<ChatMessageRole>,
    pub content: String,
    pub finish_reason: Option<String>,
}

impl StreamedReply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a chunk into the reply and returns the text it added, if any.
    pub fn apply_chunk<'a>(&mut self, chunk: &'a ChunkedResponse) -> Option<&'a str> {
        let choice = chunk
            .choices
            .iter()
            .find(|choice| choice.index.unwrap_or(0) == 0)?;
        if self.role.is_none() {
            self.role = choice.role();
        }
        if let Some(finish_reason) = &choice.finish_reason {
            self.finish_reason = Some(finish_reason.clone());
        }
        let content = choice.content().filter(|content| !content.is_empty())?;
        self.content.push_str(content);
        Some(content)
    }

    pub fn is_finished(&self) -> bool {
        self.finish_reason.is_some()
    }

    pub fn into_message(self) -> ChatCompletionRequestMessage {
        ChatCompletionRequestMessage {
            role: self.role.unwrap_or(ChatMessageRole::Assistant),
            content: self.content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(value: serde_json::Value) -> ChunkedResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn chunk_fields_map_from_snake_case() {
        let chunk = chunk(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1694268190,
            "model": "gpt-3.5-turbo",
            "choices": [{
                "index": 0,
                "delta": {"content": "Hello"},
                "finish_reason": "stop"
            }]
        }));
        assert_eq!(chunk.id, "chatcmpl-1");
        assert_eq!(chunk.created, 1694268190);
        assert_eq!(chunk.choices[0].index, Some(0));
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(chunk.choices[0].content(), Some("Hello"));
        assert_eq!(chunk.choices[0].role(), None);
    }

    #[test]
    fn chunk_requires_id_and_object() {
        let empty_id = json!({
            "id": "",
            "object": "x",
            "created": 1,
            "model": "m",
            "choices": []
        });
        assert!(serde_json::from_value::<ChunkedResponse>(empty_id).is_err());

        let missing_object = json!({"id": "1", "created": 1, "model": "m", "choices": []});
        assert!(serde_json::from_value::<ChunkedResponse>(missing_object).is_err());
    }

    #[test]
    fn request_omits_unset_fields() {
        let request = CreateChatCompletionRequest::builder()
            .model("gpt-3.5-turbo")
            .messages(vec![ChatCompletionRequestMessage::user("Hi")])
            .build();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-3.5-turbo",
                "messages": [{"role": "user", "content": "Hi"}]
            })
        );

        let mut request = request;
        request.set_stream(true);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], json!(true));
    }

    #[test]
    fn display_helpers() {
        let message = ChatCompletionRequestMessage::system("Be brief.");
        assert_eq!(message.to_string(), "system: Be brief.");

        let usage = Usage {
            prompt_tokens: 9,
            completion_tokens: Some(12),
            total_tokens: 21,
        };
        assert_eq!(usage.to_string(), "Total: 21 (Prompt: 9, Completion: 12)");
        let usage = Usage {
            completion_tokens: None,
            ..usage
        };
        assert_eq!(usage.to_string(), "Total: 21 (Prompt: 9)");

        let choice = DeltaChoice {
            index: Some(1),
            message: Some(ChatCompletionResponseMessage {
                role: ChatMessageRole::Assistant,
                content: "Sure.".to_string(),
            }),
            ..Default::default()
        };
        assert_eq!(choice.to_string(), "Choice 2 - assistant: Sure.");
    }

    #[test]
    fn streamed_reply_accumulates_first_choice() {
        let mut reply = StreamedReply::new();
        let chunks = [
            json!({"id": "1", "object": "x", "created": 1, "model": "m",
                "choices": [{"index": 0, "delta": {"role": "assistant"}}]}),
            json!({"id": "1", "object": "x", "created": 1, "model": "m",
                "choices": [{"index": 0, "delta": {"content": "Hel"}},
                            {"index": 1, "delta": {"content": "ignored"}}]}),
            json!({"id": "1", "object": "x", "created": 1, "model": "m",
                "choices": [{"index": 0, "delta": {"content": "lo"}}]}),
            json!({"id": "1", "object": "x", "created": 1, "model": "m",
                "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}),
        ]
        .map(chunk);

        let added: Vec<Option<&str>> = chunks.iter().map(|c| reply.apply_chunk(c)).collect();
        assert_eq!(added, vec![None, Some("Hel"), Some("lo"), None]);
        assert!(reply.is_finished());
        assert_eq!(reply.role, Some(ChatMessageRole::Assistant));
        assert_eq!(
            reply.into_message(),
            ChatCompletionRequestMessage::assistant("Hello")
        );
    }
}
