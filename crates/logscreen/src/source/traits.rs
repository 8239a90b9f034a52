use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::pipe::PipeWriter;

/// Reference to an uploaded log file. Owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// `http(s)://` URL, `file://` URL or a plain filesystem path.
    pub url: String,
    pub file_name: String,
    pub size: Option<u64>,
}

impl Attachment {
    pub fn new(url: impl Into<String>, file_name: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            url: url.into(),
            file_name: file_name.into(),
            size,
        }
    }

    /// Describe a path or URL. The size is left unknown.
    pub fn from_path(path: impl Into<String>) -> Self {
        let url = path.into();
        let file_name = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url.as_str())
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(url.as_str())
            .to_string();
        Self { url, file_name, size: None }
    }

    pub fn is_remote(&self) -> bool {
        self.url.starts_with("http://") || self.url.starts_with("https://")
    }

    /// Case-insensitive file name suffix check.
    pub fn has_suffix(&self, suffix: &str) -> bool {
        self.file_name.to_ascii_lowercase().ends_with(suffix)
    }

    /// Raw terminal captures are never analyzed.
    pub fn is_tty_capture(&self) -> bool {
        self.file_name.to_ascii_lowercase().contains("tty.log")
    }
}

/// Adapter producing the decoded byte stream of an attachment.
///
/// Handlers are tried in registration order; the first one whose
/// `can_handle` returns true is selected and `supply` is called exactly once.
/// `supply` must terminate the pipe on every path: dropping the writer marks
/// completion, `PipeWriter::fail` marks an error.
pub trait SourceHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, attachment: &Attachment) -> bool;

    fn supply(
        &self,
        attachment: Attachment,
        sink: PipeWriter,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, ()>;
}
