//! Source module — attachment handlers feeding the bounded byte pipe.

pub mod error;
pub mod fetch;
pub mod gzip;
pub mod pipe;
pub mod plain;
pub mod registry;
pub mod traits;
pub mod zip;

pub use error::SourceError;
pub use pipe::{pipe, PipeReader, PipeWriter};
pub use registry::HandlerRegistry;
pub use traits::{Attachment, SourceHandler};
