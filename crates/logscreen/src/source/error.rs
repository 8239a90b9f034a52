use thiserror::Error;

/// Failures surfaced by a source handler through the pipe.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Pipe closed by reader")]
    PipeClosed,

    #[error("Decompression failed: {0}")]
    Decompress(String),

    #[error("Archive contains no log file")]
    NoLogEntry,
}

impl SourceError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SourceError::Cancelled)
    }

    /// Classify a read failure. Decoders report malformed input as
    /// `InvalidData`, `InvalidInput` or a premature `UnexpectedEof`.
    pub fn from_read(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::InvalidData | ErrorKind::InvalidInput | ErrorKind::UnexpectedEof => {
                SourceError::Decompress(err.to_string())
            }
            _ => SourceError::Io(err),
        }
    }
}
