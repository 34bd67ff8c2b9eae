//! `Content-Length` framing over byte streams.
//!
//! Language servers frame every message as:
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <payload>
//! ```
//! The reading and writing halves are separate types so a session can hand
//! the reader to its background thread while requests share the writer.

#[cfg(test)]
mod tests;

use std::io::{self, BufRead, BufWriter, Write};

use thiserror::Error;

/// Errors raised while reading or writing frames.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The header block ended without a `Content-Length`.
    #[error("missing Content-Length header")]
    MissingContentLength,
    /// A `Content-Length` header did not carry a valid length.
    #[error("invalid Content-Length header: {value}")]
    InvalidHeader {
        /// The unparseable value.
        value: String,
    },
}

impl TransportError {
    /// Returns `true` when the peer closed the stream.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::Io(error) if matches!(
                error.kind(),
                io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe
            )
        )
    }
}

/// Reads framed messages from a buffered stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
}

impl<R: BufRead> FrameReader<R> {
    /// Wraps a buffered reader.
    pub const fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Receives one frame body (blocks until complete).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MissingContentLength`] if the header block
    /// has no length, [`TransportError::InvalidHeader`] for an unparseable
    /// length and [`TransportError::Io`] on read failures or end of stream.
    pub fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let content_length = self.read_headers()?;
        let mut content = vec![0_u8; content_length];
        self.reader.read_exact(&mut content)?;
        Ok(content)
    }

    fn read_headers(&mut self) -> Result<usize, TransportError> {
        let mut content_length: Option<usize> = None;

        loop {
            let mut line = String::new();
            let bytes_read = self.reader.read_line(&mut line)?;
            if bytes_read == 0 {
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed while reading headers",
                )));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }

            // Other headers such as Content-Type are ignored.
            if let Some((name, value)) = trimmed.split_once(':')
                && name.trim().eq_ignore_ascii_case("content-length")
            {
                let length = value.trim();
                let parsed = length.parse().map_err(|_| TransportError::InvalidHeader {
                    value: length.to_owned(),
                })?;
                content_length = Some(parsed);
            }
        }

        content_length.ok_or(TransportError::MissingContentLength)
    }
}

/// Writes framed messages to a stream.
#[derive(Debug)]
pub struct FrameWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Wraps a raw writer in a buffer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Sends one framed message and flushes it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if writing to the stream fails.
    pub fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        let header = format!("Content-Length: {}\r\n\r\n", message.len());
        self.writer.write_all(header.as_bytes())?;
        self.writer.write_all(message)?;
        self.writer.flush()?;
        Ok(())
    }
}
