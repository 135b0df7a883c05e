//! Line-by-line streaming of toolchain output

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::{Error, Result};

/// Handler for lines read from a toolchain process
pub trait LineHandler: Send {
    /// Called for every line, without the trailing newline
    fn on_line(&mut self, line: &str);

    /// Called when the stream closes
    fn on_close(&mut self) {}
}

/// Stream output from a toolchain process
pub struct LineStreamer<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> LineStreamer<R> {
    /// Create a new line streamer from a process stdout
    pub fn new(stdout: R) -> Self {
        Self {
            reader: BufReader::new(stdout),
        }
    }

    /// Stream output, calling the handler for each line
    ///
    /// Returns when the stream ends (process closes stdout). Bytes that are
    /// not valid UTF-8 are replaced rather than ending the stream.
    pub async fn stream<H: LineHandler>(&mut self, handler: &mut H) -> Result<()> {
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let bytes_read = self
                .reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(Error::Io)?;

            if bytes_read == 0 {
                // EOF
                break;
            }

            let line = String::from_utf8_lossy(&buf);
            handler.on_line(line.trim_end_matches(['\r', '\n']));
        }

        handler.on_close();
        Ok(())
    }
}
