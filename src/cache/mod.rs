//! # Result Cache Module
//!
//! Caches successful handler results so that repeated identical calls are answered
//! without running the handler again.
//!
//! ## Contract
//!
//! - Entries are addressed by a [`Fingerprint`] that the pipeline derives from the
//!   request context (class, version, method and arguments). The cache never derives
//!   keys itself.
//! - `put` is only issued for successful invocations of methods with `cache_ttl > 0`.
//! - Entries are immutable and replaced wholesale. A concurrent `get` sees either no
//!   entry or a complete, previously committed one.
//! - A completed `put` is visible to every later `get` of the same fingerprint.
//! - Misses are not cached (no negative caching).
//! - Concurrent misses for the same fingerprint may all invoke the handler and all
//!   write; the last write wins. There is no request coalescing.
//!
//! Errors from `get` or `put` are pipeline-fatal. A failed read is never treated as a
//! miss.
//!
//! ## Implementations
//!
//! - [`MemoryResultCache`] - bounded LRU with per-entry expiry
//! - [`NoopResultCache`] - always misses, stores nothing (caching switched off)

use serde_json::Value;

/// Longest `cache_ttl` configuration accepts (one year)
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Result cache collaborator.
pub trait ResultCache: Send + Sync {
    /// Look up a previously stored, unexpired result.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read; absence is `Ok(None)`.
    fn get(&self, fingerprint: &Fingerprint) -> anyhow::Result<Option<Value>>;

    /// Store `value` under `fingerprint` for `ttl_secs` seconds, replacing any entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized or stored.
    fn put(&self, fingerprint: &Fingerprint, value: &Value, ttl_secs: u64) -> anyhow::Result<()>;
}

/// Cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResultCache;

impl ResultCache for NoopResultCache {
    fn get(&self, _: &Fingerprint) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }

    fn put(&self, _: &Fingerprint, _: &Value, _: u64) -> anyhow::Result<()> {
        Ok(())
    }
}

pub use fingerprint::Fingerprint;
pub use memory::{CacheEntry, MemoryResultCache};

mod fingerprint;
mod memory;
