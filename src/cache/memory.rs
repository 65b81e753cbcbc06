use super::{Fingerprint, ResultCache};
use anyhow::{anyhow, Context};
use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// A committed cache entry. Never mutated; an overwrite replaces the whole entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: Fingerprint,
    /// Serialized JSON result
    pub value: Arc<str>,
    pub expires_at: Instant,
}

impl CacheEntry {
    #[inline]
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Bounded in-memory result cache.
///
/// Least recently used entries are evicted at capacity. Expired entries are evicted
/// lazily on read or by [`purge_expired`](Self::purge_expired). Values are serialized
/// before the lock is taken, so the critical section is a plain map operation.
///
/// ```rust
/// use brrtgate::cache::{MemoryResultCache, ResultCache};
/// # use brrtgate::cache::Fingerprint;
/// # use brrtgate::context::*;
/// # use serde_json::{json, Value};
/// # let call = ResolvedCall::new(CallTarget::new("get", |_: &Arguments| Ok(Value::Null)), MethodMetadata::new("1"));
/// # let key = Fingerprint::of("Orders", &call);
/// let cache = MemoryResultCache::new(128);
/// cache.put(&key, &json!({"id": 1}), 60).unwrap();
/// assert_eq!(cache.get(&key).unwrap(), Some(json!({"id": 1})));
/// ```
pub struct MemoryResultCache {
    entries: Mutex<LruCache<Fingerprint, CacheEntry>>,
}

impl MemoryResultCache {
    /// Create a cache holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries, expired ones included
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned.
    pub fn len(&self) -> anyhow::Result<usize> {
        Ok(self.lock()?.len())
    }

    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned.
    pub fn is_empty(&self) -> anyhow::Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Remove every expired entry, returning how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned.
    pub fn purge_expired(&self) -> anyhow::Result<usize> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let expired: Vec<Fingerprint> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        Ok(expired.len())
    }

    pub(crate) fn get_at(
        &self,
        fingerprint: &Fingerprint,
        now: Instant,
    ) -> anyhow::Result<Option<Value>> {
        let serialized = {
            let mut entries = self.lock()?;
            let live = match entries.get(fingerprint) {
                None => return Ok(None),
                Some(entry) if entry.is_expired(now) => None,
                Some(entry) => Some(Arc::clone(&entry.value)),
            };
            match live {
                Some(serialized) => serialized,
                None => {
                    entries.pop(fingerprint);
                    debug!(fingerprint = %fingerprint, "Evicted expired cache entry");
                    return Ok(None);
                }
            }
        };
        let value = serde_json::from_str(&serialized)
            .with_context(|| format!("corrupt cache entry {fingerprint}"))?;
        Ok(Some(value))
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, LruCache<Fingerprint, CacheEntry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("result cache lock poisoned"))
    }
}

impl ResultCache for MemoryResultCache {
    fn get(&self, fingerprint: &Fingerprint) -> anyhow::Result<Option<Value>> {
        self.get_at(fingerprint, Instant::now())
    }

    fn put(&self, fingerprint: &Fingerprint, value: &Value, ttl_secs: u64) -> anyhow::Result<()> {
        if ttl_secs == 0 {
            return Ok(());
        }
        let serialized: Arc<str> = serde_json::to_string(value)
            .context("result is not serializable")?
            .into();
        let expires_at = Instant::now()
            .checked_add(Duration::from_secs(ttl_secs))
            .ok_or_else(|| anyhow!("cache ttl of {ttl_secs}s is out of range"))?;
        let entry = CacheEntry {
            key: fingerprint.clone(),
            value: serialized,
            expires_at,
        };
        if let Some((evicted, _)) = self.lock()?.push(fingerprint.clone(), entry) {
            if &evicted != fingerprint {
                debug!(fingerprint = %evicted, "Evicted least recently used cache entry");
            }
        }
        Ok(())
    }
}
