use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Dispatch outcome counters.
///
/// All counters are relaxed atomics, so recording never blocks a dispatch. A
/// [`MetricsSnapshot`] is a point-in-time copy that can be serialized for a metrics
/// endpoint.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    dispatched: AtomicU64,
    not_found: AtomicU64,
    rate_limited: AtomicU64,
    access_denied: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    domain_failures: AtomicU64,
    unexpected_failures: AtomicU64,
    fatal: AtomicU64,
    total_latency_ns: AtomicU64,
}

/// Terminal state a dispatch ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NotFound,
    RateLimited,
    AccessDenied,
    CacheHit,
    CacheMiss,
    DomainFailure,
    UnexpectedFailure,
    Fatal,
}

impl Outcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::NotFound => "not_found",
            Outcome::RateLimited => "rate_limited",
            Outcome::AccessDenied => "access_denied",
            Outcome::CacheHit => "cache_hit",
            Outcome::CacheMiss => "cache_miss",
            Outcome::DomainFailure => "domain_failure",
            Outcome::UnexpectedFailure => "unexpected_failure",
            Outcome::Fatal => "fatal",
        }
    }
}

/// Point-in-time copy of [`DispatchMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub dispatched: u64,
    pub not_found: u64,
    pub rate_limited: u64,
    pub access_denied: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub domain_failures: u64,
    pub unexpected_failures: u64,
    pub fatal: u64,
    pub average_latency_us: u64,
}

impl DispatchMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished dispatch.
    pub fn record(&self, outcome: Outcome, latency: Duration) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ns.fetch_add(
            u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        let counter = match outcome {
            Outcome::NotFound => &self.not_found,
            Outcome::RateLimited => &self.rate_limited,
            Outcome::AccessDenied => &self.access_denied,
            Outcome::CacheHit => &self.cache_hits,
            Outcome::CacheMiss => &self.cache_misses,
            Outcome::DomainFailure => &self.domain_failures,
            Outcome::UnexpectedFailure => &self.unexpected_failures,
            Outcome::Fatal => &self.fatal,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Total number of dispatches recorded
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Mean dispatch latency; zero before the first dispatch.
    #[must_use]
    pub fn average_latency(&self) -> Duration {
        let count = self.dispatched.load(Ordering::Relaxed);
        if count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            dispatched: load(&self.dispatched),
            not_found: load(&self.not_found),
            rate_limited: load(&self.rate_limited),
            access_denied: load(&self.access_denied),
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            domain_failures: load(&self.domain_failures),
            unexpected_failures: load(&self.unexpected_failures),
            fatal: load(&self.fatal),
            average_latency_us: u64::try_from(self.average_latency().as_micros())
                .unwrap_or(u64::MAX),
        }
    }
}
