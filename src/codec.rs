//! Line-delimited JSON codec for the analysis-server wire protocol.
//!
//! The server speaks one JSON document per newline-terminated line over
//! stdin/stdout. Its output stream may interleave non-JSON noise — blank
//! lines, `Content-Length:`-style headers, stray logging — so
//! [`MessageReader`] yields parsed JSON values only and skips everything
//! else.

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum line size (4 MiB) to prevent unbounded memory allocation.
const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Reads JSON messages from an async reader, one per line.
pub struct MessageReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next JSON message.
    ///
    /// Skips lines that do not parse as JSON (logged at trace level).
    /// Returns `Ok(None)` on EOF (clean shutdown).
    /// Returns `Err` on I/O failure or an oversized line.
    pub async fn read_message(&mut self) -> Result<Option<serde_json::Value>> {
        loop {
            let mut line = Vec::new();
            let bytes_read = (&mut self.reader)
                .take(MAX_LINE_BYTES as u64 + 1)
                .read_until(b'\n', &mut line)
                .await
                .context("reading message line")?;

            if bytes_read == 0 {
                return Ok(None);
            }
            if line.len() > MAX_LINE_BYTES {
                bail!("line of {} bytes exceeds maximum {MAX_LINE_BYTES}", line.len());
            }

            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str(trimmed) {
                Ok(value) => return Ok(Some(value)),
                Err(_) => {
                    tracing::trace!("skipping non-JSON output line");
                    continue;
                }
            }
        }
    }
}

/// Writes JSON messages to an async writer, one per line.
pub struct MessageWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialize `msg` as a single line and flush it.
    pub async fn write_message(&mut self, msg: &serde_json::Value) -> Result<()> {
        let mut body = serde_json::to_string(msg).context("serializing message")?;
        body.push('\n');

        self.writer
            .write_all(body.as_bytes())
            .await
            .context("writing message line")?;
        self.writer.flush().await.context("flushing message")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip() {
        let msg = serde_json::json!({
            "seq": 1,
            "type": "request",
            "command": "open",
            "arguments": { "file": "/test.ts" }
        });

        // Write
        let mut buf = Vec::new();
        let mut writer = MessageWriter::new(&mut buf);
        writer.write_message(&msg).await.unwrap();

        // Read back
        let mut reader = MessageReader::new(buf.as_slice());
        let result = reader.read_message().await.unwrap().unwrap();
        assert_eq!(result, msg);
    }

    #[tokio::test]
    async fn test_written_message_is_one_line() {
        let msg = serde_json::json!({"seq": 1, "type": "request", "command": "close"});
        let mut buf = Vec::new();
        let mut writer = MessageWriter::new(&mut buf);
        writer.write_message(&msg).await.unwrap();

        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(text.matches('\n').count(), 1);
    }

    #[tokio::test]
    async fn test_multiple_messages() {
        let msg1 = serde_json::json!({"seq": 1, "type": "response"});
        let msg2 = serde_json::json!({"seq": 2, "type": "response"});

        let mut buf = Vec::new();
        let mut writer = MessageWriter::new(&mut buf);
        writer.write_message(&msg1).await.unwrap();
        writer.write_message(&msg2).await.unwrap();

        let mut reader = MessageReader::new(buf.as_slice());
        assert_eq!(reader.read_message().await.unwrap().unwrap(), msg1);
        assert_eq!(reader.read_message().await.unwrap().unwrap(), msg2);
    }

    #[tokio::test]
    async fn test_eof_returns_none() {
        let buf: &[u8] = b"";
        let mut reader = MessageReader::new(buf);
        assert!(reader.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_skips_header_noise_lines() {
        let buf: &[u8] = b"Content-Length: 76\r\n\r\n{\"seq\":0,\"type\":\"event\"}\n";
        let mut reader = MessageReader::new(buf);
        let msg = reader.read_message().await.unwrap().unwrap();
        assert_eq!(msg["type"], "event");
    }

    #[tokio::test]
    async fn test_skips_blank_lines() {
        let buf: &[u8] = b"\n\n{\"seq\":3,\"type\":\"response\"}\n";
        let mut reader = MessageReader::new(buf);
        let msg = reader.read_message().await.unwrap().unwrap();
        assert_eq!(msg["seq"], 3);
    }

    #[tokio::test]
    async fn test_skips_stray_logging_then_eof() {
        let buf: &[u8] = b"starting up...\nlistening\n";
        let mut reader = MessageReader::new(buf);
        assert!(reader.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unterminated_final_line_still_parses() {
        // The last line before EOF may lack a trailing newline.
        let buf: &[u8] = b"{\"seq\":9,\"type\":\"response\"}";
        let mut reader = MessageReader::new(buf);
        let msg = reader.read_message().await.unwrap().unwrap();
        assert_eq!(msg["seq"], 9);
        assert!(reader.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_line_rejected() {
        let mut buf = Vec::with_capacity(MAX_LINE_BYTES + 16);
        buf.push(b'[');
        buf.resize(MAX_LINE_BYTES + 2, b'1');
        buf.push(b'\n');

        let mut reader = MessageReader::new(buf.as_slice());
        assert!(reader.read_message().await.is_err());
    }

    #[tokio::test]
    async fn test_multibyte_utf8_line() {
        let body = r#"{"k":"é"}"#;
        let mut buf = body.as_bytes().to_vec();
        buf.push(b'\n');

        let mut reader = MessageReader::new(buf.as_slice());
        let msg = reader.read_message().await.unwrap().unwrap();
        assert_eq!(msg["k"], "é");
    }
}
