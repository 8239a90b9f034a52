use async_zip::base::read::stream::ZipFileReader;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::SourceError;
use super::fetch;
use super::pipe::PipeWriter;
use super::traits::{Attachment, SourceHandler};
use crate::conf::FetchConfig;

/// Zip archives holding a log. Local entries are read in stream order and
/// the first `*.log` entry that is not a terminal capture is unpacked into
/// the pipe; everything else is skipped.
pub struct ZipHandler {
    fetch: FetchConfig,
    chunk_size: usize,
}

impl ZipHandler {
    pub fn new(fetch: FetchConfig, chunk_size: usize) -> Self {
        Self { fetch, chunk_size }
    }
}

impl SourceHandler for ZipHandler {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn can_handle(&self, attachment: &Attachment) -> bool {
        !attachment.is_tty_capture() && attachment.has_suffix(".zip")
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
                    let written = unpack_into(reader, sink, chunk_size, &cancel).await;
                    debug!("Unpacked {} bytes from {}", written, attachment.file_name);
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", attachment.file_name, e);
                    sink.fail(e).await;
                }
            }
        })
    }
}

fn is_log_entry(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.ends_with(".log") && !name.contains("tty.log")
}

async fn unpack_into<R>(reader: R, sink: PipeWriter, chunk_size: usize, cancel: &CancellationToken) -> u64
where
    R: AsyncRead + Unpin,
{
    let mut zip = ZipFileReader::with_tokio(BufReader::new(reader));

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                sink.fail(SourceError::Cancelled).await;
                return 0;
            }
            next = zip.next_with_entry() => next,
        };

        let mut entry = match next {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                sink.fail(SourceError::NoLogEntry).await;
                return 0;
            }
            Err(e) => {
                sink.fail(SourceError::Decompress(e.to_string())).await;
                return 0;
            }
        };

        let name = entry.reader().entry().filename().as_str().ok().map(str::to_owned);
        match name {
            Some(name) if is_log_entry(&name) => {
                debug!("Selected archive entry {}", name);
                return sink.pump_from(entry.reader_mut().compat(), chunk_size, cancel).await;
            }
            Some(name) => debug!("Skipping archive entry {}", name),
            None => debug!("Skipping archive entry with non UTF-8 name"),
        }

        let skipped = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                sink.fail(SourceError::Cancelled).await;
                return 0;
            }
            skipped = entry.skip() => skipped,
        };

        zip = match skipped {
            Ok(zip) => zip,
            Err(e) => {
                sink.fail(SourceError::Decompress(e.to_string())).await;
                return 0;
            }
        };
    }
}
