//! Fetch — open the raw byte stream behind an attachment.

use std::pin::Pin;
use std::time::Duration;

use futures_util::TryStreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;

use super::error::SourceError;
use super::traits::Attachment;
use crate::conf::FetchConfig;

pub type ByteSource = Pin<Box<dyn AsyncRead + Send>>;

/// Open an attachment for reading.
///
/// `http(s)` URLs are streamed with reqwest. Anything else is treated as a
/// local path, with an optional `file://` prefix.
pub async fn open(attachment: &Attachment, config: &FetchConfig) -> Result<ByteSource, SourceError> {
    if attachment.is_remote() {
        open_remote(&attachment.url, config).await
    } else {
        let path = attachment.url.strip_prefix("file://").unwrap_or(&attachment.url);
        debug!("Opening local attachment {}", path);
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::pin(file))
    }
}

async fn open_remote(url: &str, config: &FetchConfig) -> Result<ByteSource, SourceError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .user_agent(config.user_agent.as_str())
        .build()?;

    debug!("Downloading attachment {}", url);
    let response = client.get(url).send().await?.error_for_status()?;
    let stream = response.bytes_stream().map_err(std::io::Error::other);
    Ok(Box::pin(StreamReader::new(stream)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_open_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"local contents").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let mut source = open(&Attachment::from_path(path), &FetchConfig::default()).await.unwrap();
        let mut buf = String::new();
        source.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "local contents");
    }

    #[tokio::test]
    async fn test_open_file_url() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"via url").unwrap();
        let url = format!("file://{}", file.path().display());

        let mut source = open(&Attachment::new(url, "x.log", None), &FetchConfig::default()).await.unwrap();
        let mut buf = Vec::new();
        source.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"via url");
    }

    #[tokio::test]
    async fn test_open_missing_file_is_io_error() {
        let result = open(&Attachment::from_path("/no/such/RPCS3.log"), &FetchConfig::default()).await;
        assert!(matches!(result, Err(SourceError::Io(_))));
    }
}
