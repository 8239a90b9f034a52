use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use super::model::{ErrorCode, ParseResult};

/// A wrapper that forces the wrapped data onto its own cache line.
///
/// Parses finishing concurrently bump different counter groups; keeping the
/// groups 64-byte aligned stops them from invalidating each other's lines.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct CacheAligned<T>(pub T);

/// Volume counters, updated once per finished parse.
#[derive(Debug, Default)]
pub struct VolumeMetrics {
    pub parses: AtomicU64,
    pub bytes: AtomicU64,
    pub lines: AtomicU64,
    pub time_nanos: AtomicU64,
}

/// Outcome counters, one per error code.
#[derive(Debug, Default)]
pub struct OutcomeMetrics {
    pub success: AtomicU64,
    pub policy_violation: AtomicU64,
    pub size_limit: AtomicU64,
    pub unsupported_format: AtomicU64,
    pub cancelled: AtomicU64,
    pub unknown_error: AtomicU64,
}

/// Failure detail not visible in the error code alone.
#[derive(Debug, Default)]
pub struct FailureMetrics {
    pub timeouts: AtomicU64,
    pub panics: AtomicU64,
    pub producer_failures: AtomicU64,
}

/// Lock-free analyzer counters.
///
/// All updates use `Ordering::Relaxed`; `snapshot()` may tear slightly
/// across groups.
#[derive(Debug, Default)]
pub struct AnalyzerMetrics {
    pub volume: CacheAligned<VolumeMetrics>,
    pub outcomes: CacheAligned<OutcomeMetrics>,
    pub failures: CacheAligned<FailureMetrics>,
}

impl AnalyzerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished parse.
    #[inline]
    pub fn record_result(&self, result: &ParseResult) {
        let volume = &self.volume.0;
        volume.parses.fetch_add(1, Ordering::Relaxed);
        volume.bytes.fetch_add(result.bytes_read, Ordering::Relaxed);
        volume.lines.fetch_add(result.lines_read, Ordering::Relaxed);
        volume
            .time_nanos
            .fetch_add(duration_nanos(result.elapsed), Ordering::Relaxed);

        let outcomes = &self.outcomes.0;
        let counter = match result.error {
            ErrorCode::None => &outcomes.success,
            ErrorCode::PolicyViolation => &outcomes.policy_violation,
            ErrorCode::SizeLimit => &outcomes.size_limit,
            ErrorCode::UnsupportedFormat => &outcomes.unsupported_format,
            ErrorCode::Cancelled => &outcomes.cancelled,
            ErrorCode::UnknownError => &outcomes.unknown_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_timeout(&self) {
        self.failures.0.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_panic(&self) {
        self.failures.0.panics.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_producer_failure(&self) {
        self.failures.0.producer_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let volume = &self.volume.0;
        let outcomes = &self.outcomes.0;
        let failures = &self.failures.0;

        let parses = volume.parses.load(Ordering::Relaxed);
        let time_nanos = volume.time_nanos.load(Ordering::Relaxed);

        MetricsSnapshot {
            parses,
            bytes: volume.bytes.load(Ordering::Relaxed),
            lines: volume.lines.load(Ordering::Relaxed),
            avg_parse_time_ms: if parses > 0 {
                time_nanos as f64 / parses as f64 / 1_000_000.0
            } else {
                0.0
            },
            success: outcomes.success.load(Ordering::Relaxed),
            policy_violation: outcomes.policy_violation.load(Ordering::Relaxed),
            size_limit: outcomes.size_limit.load(Ordering::Relaxed),
            unsupported_format: outcomes.unsupported_format.load(Ordering::Relaxed),
            cancelled: outcomes.cancelled.load(Ordering::Relaxed),
            unknown_error: outcomes.unknown_error.load(Ordering::Relaxed),
            timeouts: failures.timeouts.load(Ordering::Relaxed),
            panics: failures.panics.load(Ordering::Relaxed),
            producer_failures: failures.producer_failures.load(Ordering::Relaxed),
        }
    }
}

fn duration_nanos(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}

/// Point-in-time copy of the analyzer counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub parses: u64,
    pub bytes: u64,
    pub lines: u64,
    pub avg_parse_time_ms: f64,
    pub success: u64,
    pub policy_violation: u64,
    pub size_limit: u64,
    pub unsupported_format: u64,
    pub cancelled: u64,
    pub unknown_error: u64,
    pub timeouts: u64,
    pub panics: u64,
    pub producer_failures: u64,
}
