//! Pipe — bounded, backpressured byte channel between a handler and the parser.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::SourceError;

type Item = Result<Bytes, SourceError>;

/// Create a pipe holding at most `capacity` chunks in flight.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (PipeWriter { tx }, PipeReader { rx, closed: false })
}

/// Producer half. Dropping it signals end of stream.
#[derive(Debug)]
pub struct PipeWriter {
    tx: mpsc::Sender<Item>,
}

impl PipeWriter {
    /// Push a chunk, suspending while the pipe is full.
    pub async fn write(&self, chunk: Bytes) -> Result<(), SourceError> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx.send(Ok(chunk)).await.map_err(|_| SourceError::PipeClosed)
    }

    /// Terminate the stream with an error.
    pub async fn fail(self, err: SourceError) {
        if self.tx.send(Err(err)).await.is_err() {
            debug!("Pipe reader gone before error could be delivered");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Copy `reader` into the pipe in chunks of `chunk_size` bytes.
    ///
    /// Stops on cancellation (failing the pipe with `Cancelled`), on read
    /// errors (failing the pipe with the error) and when the reader side has
    /// been closed. Cancellation is observed while a read is pending. Returns the number of bytes written.
    pub async fn pump_from<R>(
        self,
        mut reader: R,
        chunk_size: usize,
        cancel: &CancellationToken,
    ) -> u64
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut written = 0u64;

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.fail(SourceError::Cancelled).await;
                    return written;
                }
                read = reader.read(&mut buf) => read,
            };

            let n = match read {
                Ok(0) => return written,
                Ok(n) => n,
                Err(e) => {
                    self.fail(SourceError::from_read(e)).await;
                    return written;
                }
            };

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.fail(SourceError::Cancelled).await;
                    return written;
                }
                sent = self.write(Bytes::copy_from_slice(&buf[..n])) => sent,
            };

            if sent.is_err() {
                debug!("Pipe closed by reader after {} bytes", written);
                return written;
            }
            written += n as u64;
        }
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<Item>,
    closed: bool,
}

impl PipeReader {
    /// Next chunk, a terminal error, or `None` once the writer is gone.
    pub async fn next_chunk(&mut self) -> Option<Item> {
        self.rx.recv().await
    }

    /// Refuse further writes. Chunks already queued are dropped.
    pub fn close(&mut self) {
        if !self.closed {
            self.rx.close();
            while self.rx.try_recv().is_ok() {}
            self.closed = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
