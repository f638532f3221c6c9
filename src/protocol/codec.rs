//! Control connection codec
//!
//! A bounded line reader shared by both ends of the control connection, the
//! server-side command reader built on it, and the reply writer.
//!
//! All partial-line state lives in the reader, so `next_line` can be dropped
//! mid-way (for example by `tokio::select!`) and resumed without losing bytes.

use log::debug;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{ClientError, CodecError};
use crate::protocol::commands::Command;
use crate::protocol::parser::parse_command;
use crate::protocol::responses::{Reply, ReplyDecoder};

/// Reads LF-terminated lines, never buffering more than `max_len` bytes of one line.
pub struct LineReader<R> {
    inner: BufReader<R>,
    max_len: usize,
    line: Vec<u8>,
    overflow: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            max_len,
            line: Vec::new(),
            overflow: false,
        }
    }

    /// Next line including its terminator.
    ///
    /// `Ok(None)` on end of stream (an unterminated tail is dropped).
    /// `Ok(Some(Err(LineTooLong)))` once the terminator of an oversized line
    /// has been consumed, so the stream is resynchronised for the next line.
    pub async fn next_line(&mut self) -> io::Result<Option<Result<Vec<u8>, CodecError>>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if !self.line.is_empty() || self.overflow {
                    debug!("Dropping unterminated line at end of stream");
                }
                self.line.clear();
                self.overflow = false;
                return Ok(None);
            }

            let (chunk, terminated) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (&available[..=i], true),
                None => (available, false),
            };
            let used = chunk.len();

            if !self.overflow {
                if self.line.len() + chunk.len() > self.max_len {
                    self.overflow = true;
                    self.line.clear();
                } else {
                    self.line.extend_from_slice(chunk);
                }
            }
            self.inner.consume(used);

            if terminated {
                if std::mem::take(&mut self.overflow) {
                    return Ok(Some(Err(CodecError::LineTooLong(self.max_len))));
                }
                return Ok(Some(Ok(std::mem::take(&mut self.line))));
            }
        }
    }
}

/// Server side: decodes commands from the control connection.
pub struct CommandReader<R> {
    lines: LineReader<R>,
}

impl<R: AsyncRead + Unpin> CommandReader<R> {
    pub fn new(inner: R, max_len: usize) -> Self {
        Self {
            lines: LineReader::new(inner, max_len),
        }
    }

    /// Next command. Framing problems are recoverable and returned inside `Some(Err(_))`;
    /// only I/O errors end the stream.
    pub async fn next_command(&mut self) -> io::Result<Option<Result<Command, CodecError>>> {
        Ok(self
            .lines
            .next_line()
            .await?
            .map(|line| line.and_then(|bytes| parse_command(&bytes))))
    }
}

/// Client side: decodes (possibly multi-line) replies.
pub struct ReplyReader<R> {
    lines: LineReader<R>,
}

impl<R: AsyncRead + Unpin> ReplyReader<R> {
    pub fn new(inner: R, max_len: usize) -> Self {
        Self {
            lines: LineReader::new(inner, max_len),
        }
    }

    pub async fn next_reply(&mut self) -> Result<Reply, ClientError> {
        let mut decoder = ReplyDecoder::default();
        loop {
            let bytes = self
                .lines
                .next_line()
                .await?
                .ok_or(ClientError::ConnectionClosed)??;
            let text = String::from_utf8_lossy(&bytes);
            let text = text.trim_end_matches(['\r', '\n']);
            if let Some(reply) = decoder.feed(text)? {
                return Ok(reply);
            }
        }
    }
}

/// Writes encoded replies (or commands) and flushes after each one.
pub struct ReplyWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> ReplyWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, reply: &Reply) -> io::Result<()> {
        self.write_raw(&reply.encode()).await
    }

    pub async fn send_command(&mut self, command: &Command) -> io::Result<()> {
        self.write_raw(&command.encode()).await
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes).await?;
        self.inner.flush().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::commands::Verb;

    #[tokio::test]
    async fn test_reads_commands_in_sequence() {
        let input: &[u8] = b"USER alice\r\nPASS secret\nQUIT\r\n";
        let mut reader = CommandReader::new(input, 64);

        let cmd = reader.next_command().await.unwrap().unwrap().unwrap();
        assert_eq!(cmd, Command::new(Verb::User, "alice"));
        let cmd = reader.next_command().await.unwrap().unwrap().unwrap();
        assert_eq!(cmd, Command::new(Verb::Pass, "secret"));
        let cmd = reader.next_command().await.unwrap().unwrap().unwrap();
        assert_eq!(cmd.verb, Verb::Quit);
        assert!(reader.next_command().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overlong_line_is_skipped_and_stream_recovers() {
        let mut input = b"RETR ".to_vec();
        input.extend(std::iter::repeat_n(b'a', 10_000));
        input.extend_from_slice(b"\r\nNOOP\r\n");
        let mut reader = CommandReader::new(input.as_slice(), 512);

        let first = reader.next_command().await.unwrap().unwrap();
        assert_eq!(first, Err(CodecError::LineTooLong(512)));
        let second = reader.next_command().await.unwrap().unwrap().unwrap();
        assert_eq!(second.verb, Verb::Noop);
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_dropped() {
        let input: &[u8] = b"NOOP\r\nRETR partial";
        let mut reader = CommandReader::new(input, 64);
        assert!(reader.next_command().await.unwrap().unwrap().is_ok());
        assert!(reader.next_command().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_line_exactly_at_limit_is_accepted() {
        // 6 bytes + CRLF = 8 bytes
        let input: &[u8] = b"NOOP x\r\n";
        let mut reader = CommandReader::new(input, 8);
        assert!(reader.next_command().await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_reply_reader_multiline() {
        let input: &[u8] =
            b"220-Welcome\r\n to the server\r\n220 Ready\r\n331 Password required\r\n";
        let mut reader = ReplyReader::new(input, 512);
        let greeting = reader.next_reply().await.unwrap();
        assert_eq!(greeting.code(), 220);
        assert_eq!(greeting.continuation().len(), 2);
        let next = reader.next_reply().await.unwrap();
        assert_eq!(next.code(), 331);
        assert!(matches!(
            reader.next_reply().await,
            Err(ClientError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_writer_encodes() {
        let mut out = Vec::new();
        {
            let mut writer = ReplyWriter::new(&mut out);
            writer.send(&Reply::new(200, "OK")).await.unwrap();
            writer
                .send_command(&Command::new(Verb::Type, "I"))
                .await
                .unwrap();
        }
        assert_eq!(out, b"200 OK\r\nTYPE I\r\n");
    }
}
