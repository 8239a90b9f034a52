use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::fetch;
use super::pipe::PipeWriter;
use super::traits::{Attachment, SourceHandler};
use crate::conf::FetchConfig;

const EXTENSIONS: &[&str] = &[".log", ".txt"];

/// Uncompressed text logs, copied through the pipe as-is.
pub struct PlainTextHandler {
    fetch: FetchConfig,
    chunk_size: usize,
}

impl PlainTextHandler {
    pub fn new(fetch: FetchConfig, chunk_size: usize) -> Self {
        Self { fetch, chunk_size }
    }
}

impl SourceHandler for PlainTextHandler {
    fn name(&self) -> &'static str {
        "plain_text"
    }

    fn can_handle(&self, attachment: &Attachment) -> bool {
        !attachment.is_tty_capture() && EXTENSIONS.iter().any(|ext| attachment.has_suffix(ext))
    }

    fn supply(
        &self,
        attachment: Attachment,
        sink: PipeWriter,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, ()> {
        let fetch = self.fetch.clone();
        let chunk_size = self.chunk_size;

        Box::pin(async move {
            let source = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    sink.fail(super::SourceError::Cancelled).await;
                    return;
                }
                opened = fetch::open(&attachment, &fetch) => opened,
            };

            match source {
                Ok(reader) => {
                    let written = sink.pump_from(reader, chunk_size, &cancel).await;
                    debug!("Supplied {} bytes of {}", written, attachment.file_name);
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", attachment.file_name, e);
                    sink.fail(e).await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::pipe::pipe;
    use std::io::Write;

    fn handler() -> PlainTextHandler {
        PlainTextHandler::new(FetchConfig::default(), 4)
    }

    #[test]
    fn test_can_handle_log_and_txt() {
        let h = handler();
        assert!(h.can_handle(&Attachment::from_path("RPCS3.log")));
        assert!(h.can_handle(&Attachment::from_path("notes.TXT")));
        assert!(!h.can_handle(&Attachment::from_path("RPCS3.log.gz")));
        assert!(!h.can_handle(&Attachment::from_path("screenshot.png")));
    }

    #[test]
    fn test_rejects_tty_capture() {
        assert!(!handler().can_handle(&Attachment::from_path("TTY.log")));
    }

    #[tokio::test]
    async fn test_supply_streams_file() {
        let mut file = tempfile::Builder::new().suffix(".log").tempfile().unwrap();
        file.write_all(b"line one\nline two\n").unwrap();
        let attachment = Attachment::from_path(file.path().to_string_lossy().to_string());

        let (writer, mut reader) = pipe(2);
        let task = tokio::spawn(handler().supply(attachment, writer, CancellationToken::new()));

        let mut collected = Vec::new();
        while let Some(chunk) = reader.next_chunk().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= 4);
            collected.extend_from_slice(&chunk);
        }
        task.await.unwrap();
        assert_eq!(collected, b"line one\nline two\n");
    }

    #[tokio::test]
    async fn test_supply_missing_file_fails_pipe() {
        let (writer, mut reader) = pipe(2);
        handler()
            .supply(Attachment::from_path("/no/such/file.log"), writer, CancellationToken::new())
            .await;

        assert!(matches!(reader.next_chunk().await, Some(Err(super::super::SourceError::Io(_)))));
    }
}
