//! stdio transport for MCP server.
//!
//! This module implements the stdio transport as specified by MCP:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! The transport is generic over its reader and writer so the same framing
//! runs against in-memory buffers in tests.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::mcp::protocol::OutgoingMessage;

/// A line-framed JSON-RPC transport.
///
/// Reads one message per line and writes one envelope per line.
pub struct LineTransport<R, W> {
    /// Buffered reader for incoming lines.
    reader: BufReader<R>,
    /// Sink for outgoing envelopes.
    writer: W,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over an arbitrary reader and writer.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Reads the next message line.
    ///
    /// Returns `None` if the input is closed (EOF). Invalid UTF-8 is replaced
    /// rather than treated as fatal, so the line still reaches the parser and
    /// is rejected there.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the input fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        let bytes_read = self.reader.read_until(b'\n', &mut buf).await?;

        if bytes_read == 0 {
            // EOF - input closed
            return Ok(None);
        }

        // Remove the trailing newline
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }

        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Writes one outgoing envelope as a single newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message(&mut self, message: &OutgoingMessage) -> io::Result<()> {
        let json = message
            .to_line()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.write_raw(&json).await
    }

    /// Writes a raw JSON string with newline termination.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    async fn write_raw(&mut self, json: &str) -> io::Result<()> {
        // MCP spec: messages must not contain embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Consumes the transport and returns the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{JsonRpcError, JsonRpcResponse, RequestId};

    #[tokio::test]
    async fn reads_lines_and_strips_terminators() {
        let input: &[u8] = b"first\r\nsecond\nlast-without-newline";
        let mut transport = LineTransport::new(input, Vec::new());

        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(
            transport.read_line().await.unwrap().as_deref(),
            Some("last-without-newline")
        );
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_not_fatal() {
        let input: &[u8] = b"{\"id\":1,\xff}\n";
        let mut transport = LineTransport::new(input, Vec::new());
        let line = transport.read_line().await.unwrap().unwrap();
        assert!(line.contains('\u{fffd}'));
    }

    #[tokio::test]
    async fn writes_one_line_per_message() {
        let mut transport = LineTransport::new(tokio::io::empty(), Vec::new());
        let ok: OutgoingMessage = JsonRpcResponse::success(
            RequestId::from(1),
            serde_json::json!({
                "message": "hello\nworld",
                "nested": {"key": "value"}
            }),
        )
        .into();
        let err: OutgoingMessage =
            JsonRpcError::method_not_found(RequestId::from(2), "test/method").into();

        transport.write_message(&ok).await.unwrap();
        transport.write_message(&err).await.unwrap();

        let written = String::from_utf8(transport.into_writer()).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(written.ends_with('\n'));
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["jsonrpc"], "2.0");
        }
    }
}
