use futures::StreamExt;
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio_util::sync::CancellationToken;

use crate::{
    client::{ChunkStream, Client},
    error::{Error, Result},
    models::{
        chat::{ChunkedResponse, CreateChatCompletionResponse, StreamingRequest},
        config::ClientConfig,
    },
};

/// Thread-blocking wrapper around [`Client`].
///
/// Owns a single-threaded runtime that drives the async client one item at
/// a time. It refuses to run on a thread that is already inside a Tokio
/// runtime, since blocking there would stall that runtime.
pub struct BlockingClient {
    inner: Client,
    runtime: Arc<Runtime>,
}

fn ensure_blocking_context() -> Result<()> {
    match Handle::try_current() {
        Ok(_) => Err(Error::BlockingInAsyncContext),
        Err(_) => Ok(()),
    }
}

impl BlockingClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        ensure_blocking_context()?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;
        let inner = {
            let _guard = runtime.enter();
            Client::new(config)?
        };
        Ok(Self {
            inner,
            runtime: Arc::new(runtime),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn create_chat_completion<R: StreamingRequest>(
        &self,
        request: R,
    ) -> Result<CreateChatCompletionResponse> {
        ensure_blocking_context()?;
        self.runtime
            .block_on(self.inner.create_chat_completion(request))
    }

    /// Blocking counterpart of [`Client::create_chat_completion_stream`].
    pub fn create_chat_completion_stream<R>(
        &self,
        request: R,
        cancel: CancellationToken,
    ) -> Result<BlockingChunkStream>
    where
        R: StreamingRequest + Send + 'static,
    {
        ensure_blocking_context()?;
        let stream = self.inner.create_chat_completion_stream(request, cancel);
        Ok(BlockingChunkStream {
            runtime: self.runtime.clone(),
            stream,
            done: false,
        })
    }
}

/// Iterator over the chunks of one streaming call. Each `next` blocks until
/// the next chunk, the end of the stream, or an error.
pub struct BlockingChunkStream {
    runtime: Arc<Runtime>,
    stream: ChunkStream,
    done: bool,
}

impl Iterator for BlockingChunkStream {
    type Item = Result<ChunkedResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(err) = ensure_blocking_context() {
            self.done = true;
            return Some(Err(err));
        }
        let item = self.runtime.block_on(self.stream.next());
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}
