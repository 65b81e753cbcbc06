//! # Guards Module
//!
//! Guards are the pre-invocation checks the pipeline runs before a handler executes:
//!
//! 1. [`RateLimiter`] is always consulted first
//! 2. [`AccessController`] runs only after the rate check passed
//!
//! Both are opaque, thread-safe services from the pipeline's point of view. Any backing
//! state (counters, credential stores) lives behind the trait and does its own
//! synchronization.
//!
//! ## Denied vs. failed
//!
//! A guard answering "no" is a normal outcome (`Ok(false)` / `allowed == false`) and is
//! rendered as a 429 or 403 envelope. A guard returning `Err` means the guard itself
//! broke (storage unreachable, misconfiguration). The pipeline never treats that as a
//! denial; it aborts the dispatch with a pipeline-fatal
//! [`DispatchError`](crate::pipeline::DispatchError).
//!
//! ## Implementations
//!
//! - [`WindowedRateLimiter`] - per-caller fixed window with an optional penalty period
//! - [`RoleAccessController`] - role membership with a transitive role hierarchy
//! - [`Unlimited`] / [`AllowAll`] - pass-through guards for trusted deployments and tests

use crate::context::{CallerIdentity, MethodMetadata};

/// Quota figures reported back to the caller as `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuota {
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the caller's quota resets
    pub reset_secs: u64,
}

/// Answer of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub quota: Option<RateQuota>,
}

impl RateDecision {
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            quota: None,
        }
    }

    #[must_use]
    pub fn deny() -> Self {
        Self {
            allowed: false,
            quota: None,
        }
    }

    #[must_use]
    pub fn with_quota(mut self, quota: RateQuota) -> Self {
        self.quota = Some(quota);
        self
    }
}

/// Rate control guard.
pub trait RateLimiter: Send + Sync {
    /// Check whether `caller` may call a method with `metadata` right now.
    ///
    /// # Errors
    ///
    /// Returns an error when the limiter cannot reach a decision. This is not a denial.
    fn check_limit(
        &self,
        caller: &CallerIdentity,
        metadata: &MethodMetadata,
    ) -> anyhow::Result<RateDecision>;
}

/// Access control guard.
pub trait AccessController: Send + Sync {
    /// Check whether `caller` holds the capability `metadata.role` requires.
    ///
    /// # Errors
    ///
    /// Returns an error when the controller cannot reach a decision. This is not a denial.
    fn has_access(&self, caller: &CallerIdentity, metadata: &MethodMetadata)
        -> anyhow::Result<bool>;
}

/// Rate limiter that never limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn check_limit(&self, _: &CallerIdentity, _: &MethodMetadata) -> anyhow::Result<RateDecision> {
        Ok(RateDecision::allow())
    }
}

/// Access controller that grants every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessController for AllowAll {
    fn has_access(&self, _: &CallerIdentity, _: &MethodMetadata) -> anyhow::Result<bool> {
        Ok(true)
    }
}

pub use access::{CapabilityStore, RoleAccessController, StaticCapabilityStore};
pub use rate_limit::{WindowedRateLimiter, MAX_WINDOW, PRUNE_EVERY};

mod access;
mod rate_limit;
