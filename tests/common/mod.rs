#![allow(dead_code)]

pub mod doubles {
    use brrtgate::cache::{Fingerprint, MemoryResultCache, ResultCache};
    use brrtgate::context::{CallerIdentity, MethodMetadata};
    use brrtgate::guards::{AccessController, RateDecision, RateLimiter};
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// What a guard double answers with
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Verdict {
        Allow,
        Deny,
        Fail,
    }

    /// Rate limiter that answers a fixed verdict and counts calls
    pub struct CountingRateLimiter {
        verdict: Verdict,
        calls: AtomicUsize,
    }

    impl CountingRateLimiter {
        pub fn new(verdict: Verdict) -> Self {
            Self {
                verdict,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RateLimiter for CountingRateLimiter {
        fn check_limit(
            &self,
            _: &CallerIdentity,
            _: &MethodMetadata,
        ) -> anyhow::Result<RateDecision> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.verdict {
                Verdict::Allow => Ok(RateDecision::allow()),
                Verdict::Deny => Ok(RateDecision::deny()),
                Verdict::Fail => Err(anyhow::anyhow!("counter store unreachable")),
            }
        }
    }

    /// Access controller that answers a fixed verdict and counts calls
    pub struct CountingAccess {
        verdict: Verdict,
        calls: AtomicUsize,
    }

    impl CountingAccess {
        pub fn new(verdict: Verdict) -> Self {
            Self {
                verdict,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AccessController for CountingAccess {
        fn has_access(&self, _: &CallerIdentity, _: &MethodMetadata) -> anyhow::Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.verdict {
                Verdict::Allow => Ok(true),
                Verdict::Deny => Ok(false),
                Verdict::Fail => Err(anyhow::anyhow!("credential store unreachable")),
            }
        }
    }

    /// In-memory cache that counts reads and writes and can be told to fail
    pub struct CountingCache {
        inner: MemoryResultCache,
        gets: AtomicUsize,
        puts: AtomicUsize,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl Default for CountingCache {
        fn default() -> Self {
            Self {
                inner: MemoryResultCache::new(64),
                gets: AtomicUsize::new(0),
                puts: AtomicUsize::new(0),
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
            }
        }
    }

    impl CountingCache {
        pub fn gets(&self) -> usize {
            self.gets.load(Ordering::SeqCst)
        }

        pub fn puts(&self) -> usize {
            self.puts.load(Ordering::SeqCst)
        }

        pub fn fail_reads(&self, fail: bool) {
            self.fail_reads.store(fail, Ordering::SeqCst);
        }

        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }
    }

    impl ResultCache for CountingCache {
        fn get(&self, fingerprint: &Fingerprint) -> anyhow::Result<Option<Value>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.fail_reads.load(Ordering::SeqCst) {
                anyhow::bail!("cache backend offline");
            }
            self.inner.get(fingerprint)
        }

        fn put(&self, fingerprint: &Fingerprint, value: &Value, ttl_secs: u64) -> anyhow::Result<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                anyhow::bail!("cache backend read-only");
            }
            self.inner.put(fingerprint, value, ttl_secs)
        }
    }
}

pub mod contexts {
    use brrtgate::context::{
        Arguments, CallTarget, CallerIdentity, Environment, MethodMetadata, RequestContext,
        ResolvedCall,
    };
    use brrtgate::failure::HandlerFailure;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Handler invocation counter shared between a test and the handlers it builds
    #[derive(Clone, Default)]
    pub struct HandlerCounter(Arc<AtomicUsize>);

    impl HandlerCounter {
        pub fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }

        /// Wrap `handler` so that every invocation is counted.
        pub fn target<F>(&self, method: &str, args: Arguments, handler: F) -> CallTarget
        where
            F: Fn(&Arguments) -> Result<Value, HandlerFailure> + Send + Sync + 'static,
        {
            let counter = Arc::clone(&self.0);
            CallTarget::new(method, move |a: &Arguments| {
                counter.fetch_add(1, Ordering::SeqCst);
                handler(a)
            })
            .with_arguments(args)
        }
    }

    pub fn context(
        target: CallTarget,
        metadata: MethodMetadata,
        environment: Environment,
    ) -> RequestContext {
        RequestContext::resolved(
            "Orders",
            http::Method::GET,
            CallerIdentity::new("alice"),
            ResolvedCall::new(target, metadata),
        )
        .with_environment(environment)
    }

    pub fn unmatched() -> RequestContext {
        RequestContext::unmatched(
            "Orders",
            "1.0",
            http::Method::DELETE,
            CallerIdentity::new("alice"),
        )
    }
}

pub mod test_tracing {
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    /// Captures formatted log output for the current thread while alive
    pub struct CapturedLogs {
        buffer: Arc<Mutex<Vec<u8>>>,
        _guard: tracing::subscriber::DefaultGuard,
    }

    #[derive(Clone)]
    struct BufferWriter(Arc<Mutex<Vec<u8>>>);

    impl io::Write for BufferWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = BufferWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl CapturedLogs {
        pub fn init() -> Self {
            let buffer = Arc::new(Mutex::new(Vec::new()));
            let subscriber = tracing_subscriber::fmt()
                .with_writer(BufferWriter(Arc::clone(&buffer)))
                .with_max_level(tracing::Level::DEBUG)
                .with_ansi(false)
                .finish();
            let guard = tracing::subscriber::set_default(subscriber);
            Self {
                buffer,
                _guard: guard,
            }
        }

        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
        }
    }
}
