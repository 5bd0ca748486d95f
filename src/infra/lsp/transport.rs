//! LSP Transport Layer
//!
//! Handles LSP message framing with Content-Length headers over any async
//! byte stream (child stdio in production, in-memory pipes in tests).

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on a single message body
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

const CONTENT_LENGTH: &str = "Content-Length";

/// Serialize a message and prepend its header
///
/// The header carries the UTF-8 byte length of the JSON body, not its
/// character count.
pub fn encode_message<T: Serialize>(message: &T) -> io::Result<Vec<u8>> {
    let body =
        serde_json::to_vec(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(encode_body(&body))
}

/// Frame an already-serialized JSON body
pub fn encode_body(body: &[u8]) -> Vec<u8> {
    let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len());
    let mut frame = Vec::with_capacity(header.len() + body.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(body);
    frame
}

/// Reads framed message bodies from the server
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next message body
    ///
    /// ```text
    /// Content-Length: 123\r\n
    /// \r\n
    /// {"jsonrpc":"2.0",...}
    /// ```
    ///
    /// Returns `Ok(None)` on a clean end of stream between messages. A stream
    /// that ends inside a header block or body is `UnexpectedEof`.
    pub async fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let content_length = match self.read_headers().await? {
            Some(len) => len,
            None => return Ok(None),
        };

        if content_length > MAX_FRAME_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Content-Length {content_length} exceeds maximum {MAX_FRAME_BYTES}"),
            ));
        }

        let mut body = vec![0u8; content_length];
        self.reader.read_exact(&mut body).await?;

        tracing::trace!("LSP <- {}", String::from_utf8_lossy(&body));

        Ok(Some(body))
    }

    /// Read headers and return Content-Length, or `None` on EOF before any header
    async fn read_headers(&mut self) -> io::Result<Option<usize>> {
        let mut content_length: Option<usize> = None;
        let mut saw_header_bytes = false;
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = self.reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                if !saw_header_bytes {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Server closed connection inside a header block",
                ));
            }
            saw_header_bytes = true;

            let line = line.trim();

            // Empty line marks end of headers
            if line.is_empty() {
                break;
            }

            if let Some((name, value)) = line.split_once(':')
                && name.trim().eq_ignore_ascii_case(CONTENT_LENGTH)
            {
                content_length = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
                );
            }
            // Ignore other headers (Content-Type, etc.)
        }

        content_length
            .map(Some)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Missing Content-Length"))
    }
}

/// Writes framed messages to the server
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        let frame = encode_message(message)?;
        self.write_frame(&frame).await
    }

    /// Write a pre-encoded frame
    pub async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await
    }

    /// Flush, shut down and drop the underlying stream
    ///
    /// Dropping matters for child stdin: `shutdown` alone leaves the pipe open.
    pub async fn close(mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}
