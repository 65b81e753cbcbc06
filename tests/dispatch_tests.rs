#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Tests for the dispatch pipeline
//!
//! # Test Coverage
//!
//! Validates the pipeline's core responsibilities:
//! - Stage order and short-circuiting (404 before 429 before 403 before cache)
//! - Cache hits, population and the `cache_ttl == 0` bypass
//! - Domain and unexpected failure rendering in both environments
//! - Collaborator failures escalating as `DispatchError`
//! - Fixed debug headers on every envelope
//! - Middleware substitution and dispatch metrics

mod common;

use brrtgate::cache::{MemoryResultCache, ResultCache};
use brrtgate::context::{Arguments, Environment, MethodMetadata, RequestContext, ResolvedCall};
use brrtgate::envelope::ResponseEnvelope;
use brrtgate::failure::{DomainError, HandlerFailure, UnexpectedFailure};
use brrtgate::guards::{
    AccessController, RateDecision, RateLimiter, RateQuota, WindowedRateLimiter, MAX_WINDOW,
};
use brrtgate::invoker::{InvocationMiddleware, Invoker};
use brrtgate::pipeline::{
    DispatchError, Pipeline, ACCESS_DENIED_MESSAGE, NO_MATCH_MESSAGE, RATE_LIMITED_MESSAGE,
    UNEXPECTED_FAILURE_MESSAGE,
};
use common::contexts::{context, unmatched, HandlerCounter};
use common::doubles::{CountingAccess, CountingCache, CountingRateLimiter, Verdict};
use common::test_tracing::CapturedLogs;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    rate: Arc<CountingRateLimiter>,
    access: Arc<CountingAccess>,
    cache: Arc<CountingCache>,
    handler: HandlerCounter,
    pipeline: Pipeline,
}

fn harness(rate: Verdict, access: Verdict) -> Harness {
    let rate = Arc::new(CountingRateLimiter::new(rate));
    let access = Arc::new(CountingAccess::new(access));
    let cache = Arc::new(CountingCache::default());
    let pipeline = Pipeline::builder()
        .rate_limiter(Arc::clone(&rate) as Arc<dyn RateLimiter>)
        .access_controller(Arc::clone(&access) as Arc<dyn AccessController>)
        .cache(Arc::clone(&cache) as Arc<dyn ResultCache>)
        .build();
    Harness {
        rate,
        access,
        cache,
        handler: HandlerCounter::default(),
        pipeline,
    }
}

impl Harness {
    fn list_call(&self, ttl: u64, env: Environment) -> RequestContext {
        let target = self
            .handler
            .target("list", Arguments::new().named("page", 1), |args: &Arguments| {
                Ok(json!({ "orders": [1, 2], "page": args.get("page") }))
            });
        context(target, MethodMetadata::new("1.0").role("orders.read").cache_ttl(ttl), env)
    }

    fn failing_call<F>(&self, env: Environment, handler: F) -> RequestContext
    where
        F: Fn(&Arguments) -> Result<Value, HandlerFailure> + Send + Sync + 'static,
    {
        let target = self.handler.target("create", Arguments::new(), handler);
        context(target, MethodMetadata::new("1.0").cache_ttl(30), env)
    }
}

fn assert_fixed_headers(env: &ResponseEnvelope, method: &str) {
    assert_eq!(env.debug_header("Class"), Some("Orders"));
    assert_eq!(env.debug_header("ClassVersion"), Some("1.0"));
    assert_eq!(env.debug_header("Method"), Some(method));
}

#[test]
fn test_no_match_dominates_every_guard() {
    let h = harness(Verdict::Deny, Verdict::Deny);
    let env = h.pipeline.dispatch(unmatched()).unwrap();

    assert_eq!(env.status(), 404);
    assert_eq!(env.error().unwrap().message, NO_MATCH_MESSAGE);
    assert!(env.payload().is_none());
    assert_fixed_headers(&env, "DELETE");
    assert_eq!(h.rate.calls(), 0);
    assert_eq!(h.access.calls(), 0);
    assert_eq!(h.cache.gets(), 0);
}

#[test]
fn test_rate_limited_call_reaches_nothing_else() {
    let h = harness(Verdict::Deny, Verdict::Allow);
    let env = h.pipeline.dispatch(h.list_call(60, Environment::Production)).unwrap();

    assert_eq!(env.status(), 429);
    assert_eq!(env.error().unwrap().message, RATE_LIMITED_MESSAGE);
    assert_fixed_headers(&env, "GET");
    assert_eq!(h.rate.calls(), 1);
    assert_eq!(h.access.calls(), 0);
    assert_eq!(h.cache.gets(), 0);
    assert_eq!(h.cache.puts(), 0);
    assert_eq!(h.handler.count(), 0);
}

#[test]
fn test_access_denied_exposes_required_role() {
    let h = harness(Verdict::Allow, Verdict::Deny);
    let env = h.pipeline.dispatch(h.list_call(60, Environment::Production)).unwrap();

    assert_eq!(env.status(), 403);
    assert_eq!(env.error().unwrap().message, ACCESS_DENIED_MESSAGE);
    assert_eq!(env.debug_header("RequestedRole"), Some("orders.read"));
    assert_fixed_headers(&env, "GET");
    assert_eq!(h.access.calls(), 1);
    assert_eq!(h.cache.gets(), 0);
    assert_eq!(h.handler.count(), 0);
}

#[test]
fn test_cache_population_then_idempotent_hits() {
    let h = harness(Verdict::Allow, Verdict::Allow);

    let miss = h.pipeline.dispatch(h.list_call(60, Environment::Production)).unwrap();
    assert_eq!(miss.status(), 200);
    assert_eq!(miss.debug_header("Cache"), Some("MISS"));
    assert_eq!(miss.cache_directive().map(|d| d.expires_in_secs), Some(60));
    assert_eq!(h.cache.puts(), 1);
    assert_eq!(h.handler.count(), 1);

    for _ in 0..2 {
        let hit = h.pipeline.dispatch(h.list_call(60, Environment::Production)).unwrap();
        assert_eq!(hit.status(), 200);
        assert_eq!(hit.debug_header("Cache"), Some("HIT"));
        assert_eq!(hit.payload(), miss.payload());
        assert_fixed_headers(&hit, "GET");
    }
    assert_eq!(h.handler.count(), 1);
    assert_eq!(h.cache.puts(), 1);

    let snapshot = h.pipeline.metrics().snapshot();
    assert_eq!(snapshot.cache_misses, 1);
    assert_eq!(snapshot.cache_hits, 2);
    assert_eq!(snapshot.dispatched, 3);
}

#[test]
fn test_cache_hit_uses_method_success_status() {
    let h = harness(Verdict::Allow, Verdict::Allow);
    let policy = brrtgate::context::StatusPolicy {
        success: 203,
        ..Default::default()
    };
    let ctx = || {
        let target = h
            .handler
            .target("list", Arguments::new(), |_: &Arguments| Ok(json!("x")));
        context(
            target,
            MethodMetadata::new("1.0").cache_ttl(10).status(policy.clone()),
            Environment::Production,
        )
    };
    assert_eq!(h.pipeline.dispatch(ctx()).unwrap().status(), 203);
    let hit = h.pipeline.dispatch(ctx()).unwrap();
    assert_eq!(hit.debug_header("Cache"), Some("HIT"));
    assert_eq!(hit.status(), 203);
}

#[test]
fn test_zero_ttl_never_touches_the_cache() {
    let h = harness(Verdict::Allow, Verdict::Allow);
    for _ in 0..3 {
        let env = h.pipeline.dispatch(h.list_call(0, Environment::Production)).unwrap();
        assert_eq!(env.debug_header("Cache"), Some("MISS"));
        assert!(env.cache_directive().is_none());
    }
    assert_eq!(h.cache.puts(), 0);
    assert_eq!(h.handler.count(), 3);
}

#[test]
fn test_different_arguments_do_not_share_cache_entries() {
    let h = harness(Verdict::Allow, Verdict::Allow);
    let call = |page: i64| {
        let target = h.handler.target(
            "list",
            Arguments::new().named("page", page),
            |a: &Arguments| Ok(json!(a.get("page"))),
        );
        context(target, MethodMetadata::new("1.0").cache_ttl(60), Environment::Production)
    };
    h.pipeline.dispatch(call(1)).unwrap();
    let second = h.pipeline.dispatch(call(2)).unwrap();
    assert_eq!(second.debug_header("Cache"), Some("MISS"));
    assert_eq!(second.payload(), Some(&json!(2)));
    assert_eq!(h.handler.count(), 2);
}

#[test]
fn test_domain_failure_in_development() {
    let h = harness(Verdict::Allow, Verdict::Allow);
    let env = h
        .pipeline
        .dispatch(h.failing_call(Environment::Development, |_| {
            Err(DomainError::new("Invalid input")
                .status(422)
                .code("E1")
                .description("The order could not be validated")
                .error("quantity must be positive")
                .into())
        }))
        .unwrap();

    assert_eq!(env.status(), 422);
    let err = env.error().unwrap();
    assert_eq!(err.message, "Invalid input");
    assert_eq!(err.code.as_deref(), Some("E1"));
    assert_eq!(err.description.as_deref(), Some("The order could not be validated"));
    assert_eq!(err.sub_errors, vec!["quantity must be positive".to_string()]);
    assert_eq!(env.debug_messages().len(), 1);
    let record = &env.debug_messages()[0];
    assert!(!record.traces.is_empty());
    assert!(record.file.ends_with("dispatch_tests.rs"));
    assert!(record.line > 0);
    assert_eq!(env.body()["debug"].as_array().map(Vec::len), Some(1));
    assert_fixed_headers(&env, "GET");
    assert_eq!(h.cache.puts(), 0);
}

#[test]
fn test_domain_failure_in_production_has_no_debug_records() {
    let h = harness(Verdict::Allow, Verdict::Allow);
    let env = h
        .pipeline
        .dispatch(h.failing_call(Environment::Production, |_| {
            Err(DomainError::new("Invalid input").status(422).code("E1").into())
        }))
        .unwrap();

    assert_eq!(env.status(), 422);
    assert_eq!(env.error().unwrap().code.as_deref(), Some("E1"));
    assert!(env.debug_messages().is_empty());
    assert!(env.body().get("debug").is_none());
}

#[test]
fn test_unexpected_failure_disclosure_depends_on_environment() {
    let raw = "connection refused: db-primary:5432";
    let failing = |_: &Arguments| -> Result<Value, HandlerFailure> {
        Err(UnexpectedFailure::new("connection refused: db-primary:5432").into())
    };

    let h = harness(Verdict::Allow, Verdict::Allow);
    let prod = h
        .pipeline
        .dispatch(h.failing_call(Environment::Production, failing))
        .unwrap();
    assert_eq!(prod.status(), 500);
    let err = prod.error().unwrap();
    assert_eq!(err.message, UNEXPECTED_FAILURE_MESSAGE);
    assert!(err.sub_errors.is_empty());
    assert!(prod.debug_messages().is_empty());
    assert!(!prod.body().to_string().contains(raw));
    assert_fixed_headers(&prod, "GET");

    let dev = h
        .pipeline
        .dispatch(h.failing_call(Environment::Development, failing))
        .unwrap();
    let err = dev.error().unwrap();
    assert_eq!(err.message, UNEXPECTED_FAILURE_MESSAGE);
    assert_eq!(err.sub_errors, vec![raw.to_string()]);
    assert_eq!(dev.debug_messages().len(), 1);
    assert!(!dev.debug_messages()[0].traces.is_empty());
    assert_fixed_headers(&dev, "GET");
}

#[test]
fn test_unexpected_failure_uses_method_error_policy() {
    let h = harness(Verdict::Allow, Verdict::Allow);
    let target = h.handler.target("create", Arguments::new(), |_: &Arguments| {
        Err(anyhow::anyhow!("disk full").into())
    });
    let meta = MethodMetadata::new("1.0").status(brrtgate::context::StatusPolicy {
        error: 503,
        error_message: Some("Order service unavailable".to_string()),
        ..Default::default()
    });
    let env = h
        .pipeline
        .dispatch(context(target, meta, Environment::Production))
        .unwrap();
    assert_eq!(env.status(), 503);
    assert_eq!(env.reason(), "Order service unavailable");
}

#[test]
fn test_panicking_handler_is_an_unexpected_failure() {
    let h = harness(Verdict::Allow, Verdict::Allow);
    let env = h
        .pipeline
        .dispatch(h.failing_call(Environment::Development, |_| panic!("slice index 9")))
        .unwrap();
    assert_eq!(env.status(), 500);
    let err = env.error().unwrap();
    assert_eq!(err.message, UNEXPECTED_FAILURE_MESSAGE);
    assert!(err.sub_errors[0].contains("slice index 9"));
    assert_eq!(h.pipeline.metrics().snapshot().unexpected_failures, 1);
}

#[test]
fn test_collaborator_failures_are_fatal() {
    let h = harness(Verdict::Fail, Verdict::Allow);
    let err = h
        .pipeline
        .dispatch(h.list_call(60, Environment::Production))
        .unwrap_err();
    assert!(matches!(err, DispatchError::RateControl(_)));
    assert!(err.to_string().starts_with("Rate control verification failed."));
    assert_eq!(h.access.calls(), 0);

    let h = harness(Verdict::Allow, Verdict::Fail);
    let err = h
        .pipeline
        .dispatch(h.list_call(60, Environment::Production))
        .unwrap_err();
    assert!(matches!(err, DispatchError::AccessControl(_)));
    assert_eq!(h.handler.count(), 0);

    let h = harness(Verdict::Allow, Verdict::Allow);
    h.cache.fail_reads(true);
    let err = h
        .pipeline
        .dispatch(h.list_call(60, Environment::Production))
        .unwrap_err();
    assert!(matches!(err, DispatchError::CacheRead(_)));
    assert_eq!(h.handler.count(), 0);

    let h = harness(Verdict::Allow, Verdict::Allow);
    h.cache.fail_writes(true);
    let err = h
        .pipeline
        .dispatch(h.list_call(60, Environment::Production))
        .unwrap_err();
    assert!(matches!(err, DispatchError::CacheWrite(_)));
    assert_eq!(h.handler.count(), 1);
    assert_eq!(h.pipeline.metrics().snapshot().fatal, 1);
}

#[test]
fn test_out_of_range_cache_ttl_is_a_cache_write_error() {
    let counter = HandlerCounter::default();
    let pipeline = Pipeline::builder()
        .cache(Arc::new(MemoryResultCache::new(8)))
        .build();
    let ctx = context(
        counter.target("list", Arguments::new(), |_: &Arguments| Ok(json!([1]))),
        MethodMetadata::new("1.0").cache_ttl(u64::MAX),
        Environment::Production,
    );

    let err = pipeline.dispatch(ctx).unwrap_err();
    assert!(matches!(err, DispatchError::CacheWrite(_)));
    assert!(err.to_string().contains("out of range"));
    assert_eq!(counter.count(), 1);
    assert_eq!(pipeline.metrics().snapshot().fatal, 1);
}

#[test]
fn test_huge_rate_windows_do_not_abort_dispatch() {
    let pipeline = Pipeline::builder()
        .rate_limiter(Arc::new(WindowedRateLimiter::new(
            1,
            Duration::from_secs(u64::MAX),
            Duration::from_secs(u64::MAX),
        )))
        .build();
    let counter = HandlerCounter::default();
    let ctx = || {
        context(
            counter.target("list", Arguments::new(), |_: &Arguments| Ok(json!(1))),
            MethodMetadata::new("1.0"),
            Environment::Production,
        )
    };

    let allowed = pipeline.dispatch(ctx()).unwrap();
    assert_eq!(allowed.status(), 200);
    let limited = pipeline.dispatch(ctx()).unwrap();
    assert_eq!(limited.status(), 429);
    let reset = MAX_WINDOW.as_secs().to_string();
    assert_eq!(limited.header("X-RateLimit-Reset"), Some(reset.as_str()));
    assert_eq!(counter.count(), 1);
}

#[test]
fn test_rate_quota_is_reported_as_headers() {
    struct Quota(bool);

    impl RateLimiter for Quota {
        fn check_limit(
            &self,
            _: &brrtgate::context::CallerIdentity,
            _: &MethodMetadata,
        ) -> anyhow::Result<RateDecision> {
            let decision = if self.0 {
                RateDecision::allow()
            } else {
                RateDecision::deny()
            };
            Ok(decision.with_quota(RateQuota {
                limit: 10,
                remaining: if self.0 { 4 } else { 0 },
                reset_secs: 17,
            }))
        }
    }

    let counter = HandlerCounter::default();
    let ctx = || {
        context(
            counter.target("list", Arguments::new(), |_: &Arguments| Ok(json!(1))),
            MethodMetadata::new("1.0"),
            Environment::Production,
        )
    };

    let allowed = Pipeline::builder().rate_limiter(Arc::new(Quota(true))).build();
    let env = allowed.dispatch(ctx()).unwrap();
    assert_eq!(env.status(), 200);
    assert_eq!(env.header("X-RateLimit-Remaining"), Some("4"));

    let denied = Pipeline::builder().rate_limiter(Arc::new(Quota(false))).build();
    let env = denied.dispatch(ctx()).unwrap();
    assert_eq!(env.status(), 429);
    assert_eq!(env.header("X-RateLimit-Limit"), Some("10"));
    assert_eq!(env.header("X-RateLimit-Remaining"), Some("0"));
    assert_eq!(env.header("X-RateLimit-Reset"), Some("17"));
}

struct Forwarding;

impl InvocationMiddleware for Forwarding {
    fn name(&self) -> &str {
        "forwarding"
    }

    fn get_result(
        &self,
        ctx: &RequestContext,
        call: &ResolvedCall,
    ) -> Result<Value, HandlerFailure> {
        match call.target.arguments().get_str("mode") {
            Some("reject") => Err(DomainError::new("Upstream rejected").status(409).into()),
            _ => Ok(json!({
                "forwarded": call.target.method_name(),
                "caller": ctx.caller.as_str(),
            })),
        }
    }
}

#[test]
fn test_middleware_replaces_direct_invocation() {
    let counter = HandlerCounter::default();
    let pipeline = Pipeline::builder()
        .invoker(Invoker::with_middleware(Arc::new(Forwarding)))
        .build();
    assert_eq!(pipeline.middleware_name(), Some("forwarding"));

    let ctx = |args: Arguments| {
        context(
            counter.target("list", args, |_: &Arguments| Ok(json!("direct"))),
            MethodMetadata::new("1.0"),
            Environment::Production,
        )
    };

    let env = pipeline.dispatch(ctx(Arguments::new())).unwrap();
    assert_eq!(env.payload(), Some(&json!({"forwarded": "list", "caller": "alice"})));
    assert_eq!(env.debug_header("Cache"), Some("MISS"));

    let env = pipeline
        .dispatch(ctx(Arguments::new().named("mode", "reject")))
        .unwrap();
    assert_eq!(env.status(), 409);
    assert_eq!(counter.count(), 0);
}

#[test]
fn test_outcomes_are_logged_with_call_fields() {
    let logs = CapturedLogs::init();
    let h = harness(Verdict::Allow, Verdict::Deny);
    let ctx = h.list_call(60, Environment::Production);
    let call_id = ctx.call_id.to_string();
    h.pipeline.dispatch(ctx).unwrap();

    let out = logs.contents();
    assert!(out.contains("Access denied"));
    assert!(out.contains("Dispatch complete"));
    assert!(out.contains(&call_id));
    assert!(out.contains("access_denied"));
}

#[test]
fn test_pipeline_is_shared_across_threads() {
    let h = Arc::new(harness(Verdict::Allow, Verdict::Allow));
    let threads: Vec<_> = (0..4)
        .map(|_| {
            let h = Arc::clone(&h);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    let env = h
                        .pipeline
                        .dispatch(h.list_call(60, Environment::Production))
                        .unwrap();
                    assert_eq!(env.status(), 200);
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    let snapshot = h.pipeline.metrics().snapshot();
    assert_eq!(snapshot.dispatched, 100);
    assert_eq!(snapshot.cache_hits + snapshot.cache_misses, 100);
    assert!(h.handler.count() >= 1);
}
