use async_compression::tokio::bufread::GzipDecoder;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::SourceError;
use super::fetch;
use super::pipe::PipeWriter;
use super::traits::{Attachment, SourceHandler};
use crate::conf::FetchConfig;

/// Gzip-compressed logs. The decoder is polled on the runtime and pushes
/// fixed-size chunks, so memory stays bounded however well the input compresses.
pub struct GzipHandler {
    fetch: FetchConfig,
    chunk_size: usize,
}

impl GzipHandler {
    pub fn new(fetch: FetchConfig, chunk_size: usize) -> Self {
        Self { fetch, chunk_size }
    }
}

impl SourceHandler for GzipHandler {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn can_handle(&self, attachment: &Attachment) -> bool {
        !attachment.is_tty_capture() && attachment.has_suffix(".gz")
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
                    sink.fail(SourceError::Cancelled).await;
                    return;
                }
                opened = fetch::open(&attachment, &fetch) => opened,
            };

            match source {
                Ok(reader) => {
                    let written = inflate_into(reader, sink, chunk_size, &cancel).await;
                    debug!("Inflated {} bytes from {}", written, attachment.file_name);
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", attachment.file_name, e);
                    sink.fail(e).await;
                }
            }
        })
    }
}

/// Decode a (possibly multi-member) gzip stream into the pipe.
async fn inflate_into<R>(reader: R, sink: PipeWriter, chunk_size: usize, cancel: &CancellationToken) -> u64
where
    R: AsyncRead + Unpin,
{
    let mut decoder = GzipDecoder::new(BufReader::new(reader));
    decoder.multiple_members(true);
    sink.pump_from(decoder, chunk_size, cancel).await
}
