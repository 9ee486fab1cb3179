use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::{DecodeError, Error, Result, TransportError},
    framer::LineFramer,
    models::chat::{ApiErrorResponse, ChunkedResponse},
};

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// What a single stream line amounts to.
#[derive(Debug)]
pub enum Decoded {
    Skip,
    Terminate,
    Chunk(ChunkedResponse),
    Malformed(serde_json::Error),
}

/// The line with one leading `data: ` removed, if it had one.
pub fn payload(line: &str) -> &str {
    line.strip_prefix(DATA_PREFIX).unwrap_or(line)
}

pub fn decode_line(line: &str) -> Decoded {
    if line.trim().is_empty() {
        return Decoded::Skip;
    }
    let data = payload(line);
    if data.starts_with(DONE_SENTINEL) {
        return Decoded::Terminate;
    }
    match serde_json::from_str::<ChunkedResponse>(data) {
        Ok(chunk) => Decoded::Chunk(chunk),
        Err(err) => Decoded::Malformed(err),
    }
}

/// Pulls chunks off a line framer until the sentinel, end of stream, an
/// error, or cancellation. Nothing more is read once any of those happen.
pub struct ChunkDecoder<R> {
    framer: LineFramer<R>,
    finished: bool,
}

impl<R: AsyncBufRead + Unpin> ChunkDecoder<R> {
    pub fn new(framer: LineFramer<R>) -> Self {
        Self {
            framer,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub async fn next_chunk(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<ChunkedResponse>> {
        while !self.finished {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                line = self.framer.next_line() => Some(line),
            };
            let Some(line) = line else {
                debug!("chat completion stream cancelled");
                self.finished = true;
                return Err(Error::Cancelled);
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("chat completion stream ended without a sentinel");
                    self.finished = true;
                    return Ok(None);
                }
                Err(err) => {
                    self.finished = true;
                    return Err(TransportError::Io(err).into());
                }
            };
            match decode_line(&line) {
                Decoded::Skip => continue,
                Decoded::Terminate => {
                    debug!("chat completion stream done");
                    self.finished = true;
                    return Ok(None);
                }
                Decoded::Chunk(chunk) => return Ok(Some(chunk)),
                Decoded::Malformed(source) => {
                    self.finished = true;
                    return Err(self.recover(line, source, cancel).await);
                }
            }
        }
        Ok(None)
    }

    /// The API reports mid-stream failures as a pretty-printed error object
    /// instead of a chunk, so its first line is a lone `{`. Read the rest
    /// and try to parse the whole thing for diagnostics. The original decode
    /// error is returned regardless, unless `cancel` fires first.
    async fn recover(
        &mut self,
        line: String,
        source: serde_json::Error,
        cancel: &CancellationToken,
    ) -> Error {
        let rest = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            rest = self.framer.read_to_end() => Some(rest),
        };
        let Some(rest) = rest else {
            debug!("chat completion stream cancelled while reading an error payload");
            return Error::Cancelled;
        };
        let recovered = match rest {
            Ok(rest) => {
                let body = format!("{}{rest}", payload(&line));
                match serde_json::from_str::<ApiErrorResponse>(&body) {
                    Ok(response) => {
                        warn!(
                            "chat completion stream reported an error: {}",
                            response.error.message
                        );
                        Some(response)
                    }
                    Err(err) => {
                        warn!("unrecognized chat completion stream payload: {err}");
                        None
                    }
                }
            }
            Err(err) => {
                warn!("failed reading the rest of a malformed stream: {err}");
                None
            }
        };
        DecodeError {
            line,
            source,
            recovered,
        }
        .into()
    }
}
