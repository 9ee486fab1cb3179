use futures::{Stream, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value;
use std::{io, pin::Pin};
use tokio_util::{io::StreamReader, sync::CancellationToken};
use tracing::{debug, info};

use crate::{
    decoder::ChunkDecoder,
    error::{Error, Result, TransportError},
    framer::LineFramer,
    models::{
        chat::{ChunkedResponse, CreateChatCompletionResponse, StreamedReply, StreamingRequest},
        config::ClientConfig,
    },
    transport::{APPLICATION_JSON, EVENT_STREAM, HttpTransport},
};

pub const CHAT_COMPLETIONS: &str = "/chat/completions";

/// Body field the caller's choice of call owns; config extras never set it.
const STREAM_FIELD: &str = "stream";

/// Chunks of one streaming call, in the order they came off the wire.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChunkedResponse>> + Send>>;

#[derive(Clone, Debug)]
pub struct Client {
    config: ClientConfig,
    transport: HttpTransport,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self { config, transport })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Serialize a request and fill in configured body fields it leaves unset.
    fn body<R: Serialize>(&self, request: &R) -> Result<Value> {
        let mut value = serde_json::to_value(request).map_err(Error::Serialize)?;
        if let Value::Object(body) = &mut value {
            let extras = self.config.json.iter().filter(|(key, _)| key.as_str() != STREAM_FIELD);
            for (key, extra) in extras {
                body.entry(key.clone()).or_insert_with(|| extra.clone());
            }
        }
        Ok(value)
    }

    pub async fn create_chat_completion<R: StreamingRequest>(
        &self,
        mut request: R,
    ) -> Result<CreateChatCompletionResponse> {
        request.set_stream(false);
        let body = self.body(&request)?;
        let response = self
            .transport
            .post(CHAT_COMPLETIONS, &body, APPLICATION_JSON)
            .await?;
        let response = response
            .json::<CreateChatCompletionResponse>()
            .await
            .map_err(TransportError::from)?;
        Ok(response)
    }

    /// Streams a chat completion.
    ///
    /// The request is always sent with `stream` set, whatever the caller put
    /// there. Nothing happens until the stream is first polled. Cancelling
    /// `cancel` ends the stream with [`Error::Cancelled`]; any error is the
    /// last item. The connection is released when the stream finishes or is
    /// dropped.
    pub fn create_chat_completion_stream<R>(
        &self,
        mut request: R,
        cancel: CancellationToken,
    ) -> ChunkStream
    where
        R: StreamingRequest + Send + 'static,
    {
        request.set_stream(true);
        Box::pin(chunk_stream(self.clone(), request, cancel))
    }

    async fn open_stream(
        &self,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            response = self.transport.post(CHAT_COMPLETIONS, body, EVENT_STREAM) => Some(response),
        };
        match response {
            Some(response) => Ok(response?),
            None => {
                debug!("chat completion stream cancelled before dispatch");
                Err(Error::Cancelled)
            }
        }
    }
}

fn chunk_stream<R>(
    client: Client,
    request: R,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<ChunkedResponse>> + Send
where
    R: StreamingRequest + Send + 'static,
{
    async_stream::try_stream! {
        let body = client.body(&request)?;
        let response = client.open_stream(&body, &cancel).await?;
        info!("streaming chat completion from {}", response.url());
        let bytes = response.bytes_stream().map_err(io::Error::other);
        let mut decoder = ChunkDecoder::new(LineFramer::new(StreamReader::new(bytes)));
        while let Some(chunk) = decoder.next_chunk(&cancel).await? {
            yield chunk;
        }
    }
}

/// Concatenate the first choice's content fragments of a whole stream.
pub async fn collect_content(mut stream: ChunkStream) -> Result<String> {
    let mut reply = StreamedReply::new();
    while let Some(chunk) = stream.next().await {
        reply.apply_chunk(&chunk?);
    }
    Ok(reply.content)
}
