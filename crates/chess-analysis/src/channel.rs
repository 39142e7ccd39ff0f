//! Owned bidirectional line channel to an engine.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tracing::debug;
use uci::EngineCommand;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Line-oriented duplex channel over any async byte stream pair.
///
/// The engine client only ever talks to the engine through this type, so
/// it works the same over child-process pipes and in-memory test streams.
pub struct LineChannel {
    reader: Lines<BufReader<BoxedReader>>,
    writer: BoxedWriter,
}

impl LineChannel {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        Self {
            reader: BufReader::new(reader).lines(),
            writer: Box::new(writer),
        }
    }

    /// Write one command followed by a newline and flush.
    pub async fn send(&mut self, command: &EngineCommand) -> io::Result<()> {
        let line = command.to_uci();
        debug!(cmd = %line, "engine <");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Read the next line, trimmed. `Ok(None)` means the engine closed its output.
    ///
    /// Cancel safe: no data is lost if the future is dropped before completion.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        let line = self.reader.next_line().await?;
        Ok(line.map(|l| {
            let trimmed = l.trim().to_string();
            debug!(line = %trimmed, "engine >");
            trimmed
        }))
    }

    /// Shut down the write half, signalling EOF to the engine.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}
