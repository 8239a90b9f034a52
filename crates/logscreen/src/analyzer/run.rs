use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::conf::AnalyzerConfig;
use crate::filter::ContentFilter;
use crate::parser::metrics::AnalyzerMetrics;
use crate::parser::{sections, ErrorCode, Grammar, GrammarError, LogParser, ParseResult, ParserLimits};
use crate::source::{pipe, Attachment, HandlerRegistry};

/// How long a producer may take to wind down after the parse has finished.
const PRODUCER_GRACE: Duration = Duration::from_secs(5);

/// Entry point: attachment in, `ParseResult` out.
///
/// Never fails; every problem is reported through `ParseResult::error`.
pub struct LogAnalyzer {
    registry: HandlerRegistry,
    parser: Arc<LogParser>,
    limiter: Arc<Semaphore>,
    pipe_capacity: usize,
    parse_timeout: Duration,
    metrics: Arc<AnalyzerMetrics>,
}

impl LogAnalyzer {
    pub fn new(
        config: &AnalyzerConfig,
        registry: HandlerRegistry,
        grammar: Arc<Grammar>,
        filter: Arc<ContentFilter>,
    ) -> Self {
        Self {
            registry,
            parser: Arc::new(LogParser::new(grammar, filter, ParserLimits::from(config))),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_parses.max(1))),
            pipe_capacity: config.pipe_capacity,
            parse_timeout: Duration::from_secs(config.parse_timeout_secs),
            metrics: Arc::new(AnalyzerMetrics::new()),
        }
    }

    /// Built-in handlers and the emulator log grammar.
    pub fn with_defaults(config: &AnalyzerConfig, filter: Arc<ContentFilter>) -> Result<Self, GrammarError> {
        let registry = HandlerRegistry::with_defaults(&config.fetch, config.chunk_size);
        let grammar = Arc::new(sections::emulator_log()?);
        Ok(Self::new(config, registry, grammar, filter))
    }

    pub fn with_parse_timeout(mut self, timeout: Duration) -> Self {
        self.parse_timeout = timeout;
        self
    }

    pub fn metrics(&self) -> Arc<AnalyzerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub async fn analyze(&self, attachment: Attachment) -> ParseResult {
        self.analyze_with_cancel(attachment, CancellationToken::new()).await
    }

    /// Analyze one attachment. Cancelling `cancel` ends the parse with
    /// `ErrorCode::Cancelled`.
    pub async fn analyze_with_cancel(&self, attachment: Attachment, cancel: CancellationToken) -> ParseResult {
        let result = self.run(attachment, cancel).await;
        self.metrics.record_result(&result);
        result
    }

    async fn run(&self, attachment: Attachment, cancel: CancellationToken) -> ParseResult {
        let Some(handler) = self.registry.select(&attachment) else {
            info!("No source handler for attachment {}", attachment.file_name);
            return ParseResult {
                bytes_total: attachment.size,
                ..ParseResult::failed(ErrorCode::UnsupportedFormat)
            };
        };
        let handler_name = handler.name();

        // Callers queue here instead of being rejected
        let Ok(_permit) = self.limiter.acquire().await else {
            error!("Parse limiter closed");
            return ParseResult::failed(ErrorCode::UnknownError);
        };

        info!("Analyzing {} with the {} handler", attachment.file_name, handler_name);
        let parse_cancel = cancel.child_token();
        let (writer, reader) = pipe(self.pipe_capacity);
        let producer = tokio::spawn(handler.supply(attachment.clone(), writer, parse_cancel.clone()));

        let timed_out = Arc::new(AtomicBool::new(false));
        let watchdog = {
            let token = parse_cancel.clone();
            let flag = Arc::clone(&timed_out);
            let timeout = self.parse_timeout;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        flag.store(true, Ordering::Relaxed);
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        };

        let parsed = AssertUnwindSafe(self.parser.parse(reader, &parse_cancel, attachment.size))
            .catch_unwind()
            .await;

        let mut result = match parsed {
            Ok(result) => result,
            Err(_) => {
                error!("Parser panicked on {}", attachment.file_name);
                self.metrics.record_panic();
                ParseResult {
                    bytes_total: attachment.size,
                    ..ParseResult::failed(ErrorCode::UnknownError)
                }
            }
        };

        // Stops the watchdog and any producer still running
        parse_cancel.cancel();
        watchdog.abort();

        if result.error == ErrorCode::None {
            // A producer that died without failing the pipe looks like a clean
            // end of stream to the parser
            match tokio::time::timeout(PRODUCER_GRACE, producer).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Source handler {} failed: {}", handler_name, e);
                    self.metrics.record_producer_failure();
                    result.error = ErrorCode::UnknownError;
                }
                Err(_) => debug!("Source handler {} still winding down", handler_name),
            }
        }

        if result.error == ErrorCode::Cancelled && timed_out.load(Ordering::Relaxed) && !cancel.is_cancelled() {
            warn!(
                "Parse of {} timed out after {:?}",
                attachment.file_name, self.parse_timeout
            );
            self.metrics.record_timeout();
        }

        result.handler = Some(handler_name.to_string());
        info!(
            "Finished {}: {} ({} bytes, {} sections)",
            attachment.file_name,
            result.error,
            result.bytes_read,
            result.completed_sections.len()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SectionBuilder;
    use crate::source::{PipeWriter, SourceError, SourceHandler};
    use bytes::Bytes;
    use futures_util::future::BoxFuture;
    use std::io::Write;

    fn ab_grammar() -> Arc<Grammar> {
        Arc::new(
            Grammar::builder()
                .section(SectionBuilder::new("A").field("x", r"x=(?P<x>\S+)").end_trigger("END-A"))
                .section(SectionBuilder::new("B").field("y", r"y=(?P<y>\S+)").end_trigger("END-B"))
                .build()
                .unwrap(),
        )
    }

    fn analyzer_with(config: AnalyzerConfig, filter: ContentFilter, registry: HandlerRegistry) -> LogAnalyzer {
        LogAnalyzer::new(&config, registry, ab_grammar(), Arc::new(filter))
    }

    fn analyzer(config: AnalyzerConfig, filter: ContentFilter) -> LogAnalyzer {
        let registry = HandlerRegistry::with_defaults(&config.fetch, config.chunk_size);
        analyzer_with(config, filter, registry)
    }

    fn log_file(suffix: &str, contents: &[u8]) -> (tempfile::NamedTempFile, Attachment) {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents).unwrap();
        let attachment = Attachment::new(
            file.path().to_string_lossy().to_string(),
            format!("upload{}", suffix),
            Some(contents.len() as u64),
        );
        (file, attachment)
    }

    /// Sends one line, then waits for cancellation.
    struct StallingHandler;

    impl SourceHandler for StallingHandler {
        fn name(&self) -> &'static str {
            "stalling"
        }

        fn can_handle(&self, _attachment: &Attachment) -> bool {
            true
        }

        fn supply(&self, _a: Attachment, sink: PipeWriter, cancel: CancellationToken) -> BoxFuture<'static, ()> {
            Box::pin(async move {
                let _ = sink.write(Bytes::from_static(b"x=1\n")).await;
                cancel.cancelled().await;
                sink.fail(SourceError::Cancelled).await;
            })
        }
    }

    /// Drops the writer while unwinding.
    struct PanickingHandler;

    impl SourceHandler for PanickingHandler {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn can_handle(&self, _attachment: &Attachment) -> bool {
            true
        }

        fn supply(&self, _a: Attachment, sink: PipeWriter, _c: CancellationToken) -> BoxFuture<'static, ()> {
            Box::pin(async move {
                let _ = sink.write(Bytes::from_static(b"x=1\n")).await;
                panic!("handler bug");
            })
        }
    }

    fn registry_of(handler: Box<dyn SourceHandler>) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register(handler);
        registry
    }

    #[tokio::test]
    async fn test_plain_text_end_to_end() {
        let (_file, attachment) = log_file(".log", b"x=1\nEND-A\ny=2\nEND-B\n");
        let result = analyzer(AnalyzerConfig::default(), ContentFilter::new()).analyze(attachment).await;

        assert_eq!(result.error, ErrorCode::None);
        assert_eq!(result.handler.as_deref(), Some("plain_text"));
        assert_eq!(result.completed_sections, vec!["A", "B"]);
        assert_eq!(result.field("y"), Some("2"));
        assert_eq!(result.bytes_read, 20);
        assert_eq!(result.bytes_total, Some(20));
    }

    #[tokio::test]
    async fn test_gzip_end_to_end() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"x=1\r\nEND-A\r\ny=2\r\nEND-B\r\n").unwrap();
        let (_file, attachment) = log_file(".log.gz", &encoder.finish().unwrap());

        let result = analyzer(AnalyzerConfig::default(), ContentFilter::new()).analyze(attachment).await;
        assert_eq!(result.error, ErrorCode::None);
        assert_eq!(result.handler.as_deref(), Some("gzip"));
        assert_eq!(result.field("x"), Some("1"));
        assert_eq!(result.completed_sections.len(), 2);
    }

    #[tokio::test]
    async fn test_zip_end_to_end() {
        use async_zip::base::write::ZipFileWriter;
        use async_zip::{Compression, ZipEntryBuilder};

        let mut writer = ZipFileWriter::new(Vec::<u8>::new());
        let entry = ZipEntryBuilder::new("RPCS3.log".to_string().into(), Compression::Deflate);
        writer.write_entry_whole(entry, b"x=1\nEND-A\ny=2\nEND-B\n").await.unwrap();
        let (_file, attachment) = log_file(".zip", &writer.close().await.unwrap());

        let result = analyzer(AnalyzerConfig::default(), ContentFilter::new()).analyze(attachment).await;
        assert_eq!(result.error, ErrorCode::None);
        assert_eq!(result.handler.as_deref(), Some("zip"));
        assert_eq!(result.completed_sections, vec!["A", "B"]);
        assert_eq!(result.bytes_read, 20);
    }

    #[tokio::test]
    async fn test_unsupported_extension_reads_nothing() {
        let analyzer = analyzer(AnalyzerConfig::default(), ContentFilter::new());
        let result = analyzer
            .analyze(Attachment::new("/does/not/exist.exe", "game.exe", Some(1234)))
            .await;

        assert_eq!(result.error, ErrorCode::UnsupportedFormat);
        assert_eq!(result.bytes_read, 0);
        assert_eq!(result.bytes_total, Some(1234));
        assert_eq!(result.handler, None);
        assert_eq!(analyzer.metrics().snapshot().unsupported_format, 1);
    }

    #[tokio::test]
    async fn test_policy_violation_end_to_end() {
        let filter = ContentFilter::new();
        filter.add("pirated").unwrap();
        let (_file, attachment) = log_file(".log", b"x=1\nPIRATED copy\nEND-A\ny=2\nEND-B\n");

        let result = analyzer(AnalyzerConfig::default(), filter).analyze(attachment).await;
        assert_eq!(result.error, ErrorCode::PolicyViolation);
        assert!(result.completed_sections.is_empty());
        assert_eq!(result.violation.unwrap().term, "pirated");
    }

    #[tokio::test]
    async fn test_size_limit_end_to_end() {
        let config = AnalyzerConfig { log_size_limit: 10, chunk_size: 3, ..Default::default() };
        let (_file, attachment) = log_file(".log", b"x=1\nx=2\nx=3\nEND-A\n");

        let result = analyzer(config, ContentFilter::new()).analyze(attachment).await;
        assert_eq!(result.error, ErrorCode::SizeLimit);
        assert_eq!(result.bytes_read, 8);
        assert!(result.user_message().contains("8 bytes"));
    }

    #[tokio::test]
    async fn test_missing_file_is_unknown_error() {
        let result = analyzer(AnalyzerConfig::default(), ContentFilter::new())
            .analyze(Attachment::from_path("/no/such/dir/RPCS3.log"))
            .await;
        assert_eq!(result.error, ErrorCode::UnknownError);
        assert_eq!(result.handler.as_deref(), Some("plain_text"));
    }

    #[tokio::test]
    async fn test_caller_cancellation() {
        let analyzer = analyzer_with(
            AnalyzerConfig::default(),
            ContentFilter::new(),
            registry_of(Box::new(StallingHandler)),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = analyzer
            .analyze_with_cancel(Attachment::from_path("RPCS3.log"), cancel)
            .await;
        assert_eq!(result.error, ErrorCode::Cancelled);
        assert_eq!(analyzer.metrics().snapshot().timeouts, 0);
    }

    #[tokio::test]
    async fn test_parse_timeout_is_cancelled() {
        let analyzer = analyzer_with(
            AnalyzerConfig::default(),
            ContentFilter::new(),
            registry_of(Box::new(StallingHandler)),
        )
        .with_parse_timeout(Duration::from_millis(30));

        let result = analyzer.analyze(Attachment::from_path("RPCS3.log")).await;
        assert_eq!(result.error, ErrorCode::Cancelled);
        assert_eq!(result.bytes_read, 4);
        assert_eq!(analyzer.metrics().snapshot().timeouts, 1);
    }

    #[tokio::test]
    async fn test_panicking_producer_is_unknown_error() {
        let analyzer = analyzer_with(
            AnalyzerConfig::default(),
            ContentFilter::new(),
            registry_of(Box::new(PanickingHandler)),
        );

        let result = analyzer.analyze(Attachment::from_path("RPCS3.log")).await;
        assert_eq!(result.error, ErrorCode::UnknownError);
        assert_eq!(analyzer.metrics().snapshot().producer_failures, 1);
    }

    #[tokio::test]
    async fn test_concurrent_parses_queue_on_limit() {
        let config = AnalyzerConfig { max_concurrent_parses: 1, ..Default::default() };
        let analyzer = Arc::new(analyzer(config, ContentFilter::new()));
        let (_f1, first) = log_file(".log", b"x=1\nEND-A\ny=1\nEND-B\n");
        let (_f2, second) = log_file(".txt", b"x=2\nEND-A\ny=2\nEND-B\n");

        let a = Arc::clone(&analyzer);
        let b = Arc::clone(&analyzer);
        let (r1, r2) = tokio::join!(a.analyze(first), b.analyze(second));

        assert_eq!(r1.field("x"), Some("1"));
        assert_eq!(r2.field("x"), Some("2"));
        assert_eq!(analyzer.metrics().snapshot().success, 2);
    }

    #[tokio::test]
    async fn test_with_defaults_uses_emulator_grammar() {
        let analyzer = LogAnalyzer::with_defaults(&AnalyzerConfig::default(), Arc::new(ContentFilter::new())).unwrap();
        assert_eq!(analyzer.registry().names(), vec!["gzip", "zip", "plain_text"]);

        let (_file, attachment) = log_file(".log", b"RPCS3 v0.0.30 Alpha\nSYS: Serial: BLUS30443\n");
        let result = analyzer.analyze(attachment).await;
        assert_eq!(result.error, ErrorCode::None);
        assert_eq!(result.incomplete_section.as_deref(), Some("header"));
        assert!(result.completed_sections.is_empty());
    }
}
