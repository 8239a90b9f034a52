use super::gzip::GzipHandler;
use super::plain::PlainTextHandler;
use super::zip::ZipHandler;
use super::traits::{Attachment, SourceHandler};
use crate::conf::FetchConfig;

/// Ordered set of source handlers.
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn SourceHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Built-in handlers in priority order.
    pub fn with_defaults(fetch: &FetchConfig, chunk_size: usize) -> Self {
        let handlers: Vec<Box<dyn SourceHandler>> = vec![
            // Order matters! Compressed formats before the plain text fallback
            Box::new(GzipHandler::new(fetch.clone(), chunk_size)),
            Box::new(ZipHandler::new(fetch.clone(), chunk_size)),
            Box::new(PlainTextHandler::new(fetch.clone(), chunk_size)),
        ];

        Self { handlers }
    }

    /// Append a handler with the lowest priority so far.
    pub fn register(&mut self, handler: Box<dyn SourceHandler>) {
        self.handlers.push(handler);
    }

    /// First handler claiming the attachment. No I/O happens here.
    pub fn select(&self, attachment: &Attachment) -> Option<&dyn SourceHandler> {
        self.handlers
            .iter()
            .find(|h| h.can_handle(attachment))
            .map(|h| h.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::pipe::PipeWriter;
    use futures_util::future::BoxFuture;
    use tokio_util::sync::CancellationToken;

    struct ClaimAll;

    impl SourceHandler for ClaimAll {
        fn name(&self) -> &'static str {
            "claim_all"
        }

        fn can_handle(&self, _attachment: &Attachment) -> bool {
            true
        }

        fn supply(&self, _a: Attachment, _s: PipeWriter, _c: CancellationToken) -> BoxFuture<'static, ()> {
            Box::pin(async {})
        }
    }

    fn registry() -> HandlerRegistry {
        HandlerRegistry::with_defaults(&FetchConfig::default(), 8192)
    }

    #[test]
    fn test_default_priority_order() {
        assert_eq!(registry().names(), vec!["gzip", "zip", "plain_text"]);
    }

    #[test]
    fn test_select_first_match_wins() {
        let r = registry();
        assert_eq!(r.select(&Attachment::from_path("RPCS3.log.gz")).unwrap().name(), "gzip");
        assert_eq!(r.select(&Attachment::from_path("RPCS3.zip")).unwrap().name(), "zip");
        assert_eq!(r.select(&Attachment::from_path("RPCS3.log")).unwrap().name(), "plain_text");
    }

    #[test]
    fn test_select_unsupported_extension() {
        assert!(registry().select(&Attachment::from_path("RPCS3.exe")).is_none());
        assert!(registry().select(&Attachment::from_path("TTY.log")).is_none());
    }

    #[test]
    fn test_registered_handler_has_lowest_priority() {
        let mut r = registry();
        r.register(Box::new(ClaimAll));

        assert_eq!(r.len(), 4);
        assert_eq!(r.select(&Attachment::from_path("RPCS3.log")).unwrap().name(), "plain_text");
        assert_eq!(r.select(&Attachment::from_path("RPCS3.7z")).unwrap().name(), "claim_all");
    }

    #[test]
    fn test_empty_registry_selects_nothing() {
        let r = HandlerRegistry::new();
        assert!(r.is_empty());
        assert!(r.select(&Attachment::from_path("RPCS3.log")).is_none());
    }
}
