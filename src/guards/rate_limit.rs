use super::{RateDecision, RateLimiter, RateQuota};
use crate::context::{CallerIdentity, MethodMetadata};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest interval or penalty a limiter honours; longer values are clamped (one year)
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Expired windows are pruned on every this many counted checks
pub const PRUNE_EVERY: u64 = 256;

/// Counting window of a single caller.
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
    blocked_until: Option<Instant>,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self {
            started: now,
            count: 0,
            blocked_until: None,
        }
    }
}

/// In-memory fixed-window rate limiter keyed by caller identity.
///
/// Each caller may make `limit` calls per `interval`. The call that exceeds the limit
/// blocks the caller for `penalty` (or, with a zero penalty, until the window ends).
/// Methods flagged `rate_control_exempt` are neither counted nor limited. A `limit` of 0
/// disables rate control entirely.
///
/// Windows live in a [`DashMap`], so concurrent checks for different callers never
/// contend on a shared lock. Windows that ended without an active penalty are dropped
/// every [`PRUNE_EVERY`] checks. `interval` and `penalty` are clamped to [`MAX_WINDOW`].
///
/// # Usage
///
/// ```rust
/// use brrtgate::guards::{RateLimiter, WindowedRateLimiter};
/// use brrtgate::context::{CallerIdentity, MethodMetadata};
/// use std::time::Duration;
///
/// let limiter = WindowedRateLimiter::new(2, Duration::from_secs(60), Duration::ZERO);
/// let caller = CallerIdentity::new("10.0.0.1");
/// let meta = MethodMetadata::new("1.0");
/// assert!(limiter.check_limit(&caller, &meta).unwrap().allowed);
/// assert!(limiter.check_limit(&caller, &meta).unwrap().allowed);
/// assert!(!limiter.check_limit(&caller, &meta).unwrap().allowed);
/// ```
pub struct WindowedRateLimiter {
    limit: u32,
    interval: Duration,
    penalty: Duration,
    windows: DashMap<CallerIdentity, Window>,
    checks: AtomicU64,
}

impl WindowedRateLimiter {
    #[must_use]
    pub fn new(limit: u32, interval: Duration, penalty: Duration) -> Self {
        Self {
            limit,
            interval: interval.min(MAX_WINDOW),
            penalty: penalty.min(MAX_WINDOW),
            windows: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    /// Number of callers currently tracked
    #[must_use]
    pub fn tracked_callers(&self) -> usize {
        self.windows.len()
    }

    /// Drop windows that ended and carry no active penalty.
    pub fn prune(&self) {
        self.prune_at(Instant::now());
    }

    fn prune_at(&self, now: Instant) {
        let before = self.windows.len();
        self.windows.retain(|_, w| {
            let blocked = w.blocked_until.is_some_and(|until| until > now);
            blocked || now.saturating_duration_since(w.started) < self.interval
        });
        let dropped = before.saturating_sub(self.windows.len());
        if dropped > 0 {
            debug!(dropped, remaining = self.windows.len(), "Pruned rate control windows");
        }
    }

    pub(crate) fn check_at(
        &self,
        caller: &CallerIdentity,
        metadata: &MethodMetadata,
        now: Instant,
    ) -> RateDecision {
        if self.limit == 0 || metadata.rate_control_exempt {
            return RateDecision::allow();
        }

        // must run before an entry guard is held
        if (self.checks.fetch_add(1, Ordering::Relaxed) + 1) % PRUNE_EVERY == 0 {
            self.prune_at(now);
        }

        let mut window = self
            .windows
            .entry(caller.clone())
            .or_insert_with(|| Window::new(now));

        let blocked_until = window.blocked_until;
        if let Some(until) = blocked_until {
            if until > now {
                return RateDecision::deny().with_quota(RateQuota {
                    limit: self.limit,
                    remaining: 0,
                    reset_secs: ceil_secs(until.saturating_duration_since(now)),
                });
            }
            *window = Window::new(now);
        }

        if now.saturating_duration_since(window.started) >= self.interval {
            *window = Window::new(now);
        }

        window.count = window.count.saturating_add(1);
        let window_end = window.started + self.interval;

        if window.count > self.limit {
            let until = if self.penalty.is_zero() {
                window_end
            } else {
                now + self.penalty
            };
            window.blocked_until = Some(until);
            debug!(
                caller = %caller,
                limit = self.limit,
                blocked_secs = ceil_secs(until.saturating_duration_since(now)),
                "Rate limit exceeded"
            );
            return RateDecision::deny().with_quota(RateQuota {
                limit: self.limit,
                remaining: 0,
                reset_secs: ceil_secs(until.saturating_duration_since(now)),
            });
        }

        RateDecision::allow().with_quota(RateQuota {
            limit: self.limit,
            remaining: self.limit - window.count,
            reset_secs: ceil_secs(window_end.saturating_duration_since(now)),
        })
    }
}

impl RateLimiter for WindowedRateLimiter {
    fn check_limit(
        &self,
        caller: &CallerIdentity,
        metadata: &MethodMetadata,
    ) -> anyhow::Result<RateDecision> {
        Ok(self.check_at(caller, metadata, Instant::now()))
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
