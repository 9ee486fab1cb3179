use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Splits a byte stream into text lines.
///
/// The framer owns its reader for the whole decode, so dropping the framer
/// releases the underlying connection.
pub struct LineFramer<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> LineFramer<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Next line without its `\n` or `\r\n` terminator. `None` means the
    /// stream ended, while `Some("")` is a blank line.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    /// Everything left in the stream, as is.
    pub async fn read_to_end(&mut self) -> io::Result<String> {
        let mut rest = String::new();
        self.reader.read_to_string(&mut rest).await?;
        Ok(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::LineFramer;

    #[tokio::test]
    async fn lines_strip_terminators_and_keep_blanks() {
        let mut framer = LineFramer::new(&b"first\r\n\nsecond\nlast"[..]);
        assert_eq!(framer.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(framer.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(framer.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(framer.next_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(framer.next_line().await.unwrap(), None);
        assert_eq!(framer.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_to_end_returns_the_unread_rest() {
        let mut framer = LineFramer::new(&b"{\n  \"a\": 1\n}\n"[..]);
        assert_eq!(framer.next_line().await.unwrap().as_deref(), Some("{"));
        assert_eq!(framer.read_to_end().await.unwrap(), "  \"a\": 1\n}\n");
        assert_eq!(framer.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_error() {
        let mut framer = LineFramer::new(&b"data: \xff\xfe\n"[..]);
        assert!(framer.next_line().await.is_err());
    }
}
