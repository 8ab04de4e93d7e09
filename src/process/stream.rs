use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::error::{ProcessError, ProcessResult};

/// Turn raw bytes of one output line into text
///
/// Invalid UTF-8 is replaced rather than rejected, the line terminator
/// (`\n`, `\r\n` or a lone `\r`) is removed, and with `strip` surrounding
/// whitespace is dropped as well.
pub fn decode_line(bytes: &[u8], strip: bool) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_end_matches('\n').trim_end_matches('\r');
    if strip {
        text.trim().to_string()
    } else {
        text.to_string()
    }
}

/// Reads decoded lines from the output of a process
pub struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    strip: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Create a new line reader
    pub fn new(inner: R, strip: bool) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::with_capacity(256),
            strip,
        }
    }

    /// Get the next line, `None` once the stream is exhausted
    ///
    /// A final line without terminator is still returned. Cancel safe: bytes
    /// of a partly read line stay buffered for the next call.
    pub async fn next_line(&mut self) -> ProcessResult<Option<String>> {
        let n = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .await
            .map_err(ProcessError::Read)?;
        if n == 0 && self.buf.is_empty() {
            return Ok(None);
        }
        let line = decode_line(&self.buf, self.strip);
        self.buf.clear();
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"Time = 1\n", false), "Time = 1");
        assert_eq!(decode_line(b"Time = 1\r\n", false), "Time = 1");
        assert_eq!(decode_line(b"  padded  \n", true), "padded");
        assert_eq!(decode_line(b"  padded  \n", false), "  padded  ");
        assert_eq!(decode_line(b"bad \xff byte\n", false), "bad \u{fffd} byte");
    }

    #[tokio::test]
    async fn test_reads_all_lines() {
        let input: &[u8] = b"first\r\nsecond\n\nlast";
        let mut reader = LineReader::new(input, false);

        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            lines.push(line);
        }
        assert_eq!(lines, vec!["first", "second", "", "last"]);
    }
}
