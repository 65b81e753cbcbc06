use super::error::DispatchError;
use super::metrics::{DispatchMetrics, Outcome};
use crate::cache::{Fingerprint, MemoryResultCache, NoopResultCache, ResultCache};
use crate::config::{ConfigError, GatewayConfig};
use crate::context::{RequestContext, ResolvedCall};
use crate::envelope::{DebugRecord, ErrorDescriptor, ResponseEnvelope};
use crate::failure::{DomainError, UnexpectedFailure};
use crate::guards::{
    AccessController, AllowAll, RateLimiter, RoleAccessController, StaticCapabilityStore,
    Unlimited, WindowedRateLimiter,
};
use crate::invoker::{InvocationOutcome, Invoker, MiddlewareRegistry};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Debug header carrying the resolved service class
pub const HEADER_CLASS: &str = "Class";
/// Debug header carrying the resolved service version
pub const HEADER_CLASS_VERSION: &str = "ClassVersion";
/// Debug header carrying the uppercased HTTP method
pub const HEADER_METHOD: &str = "Method";
/// Debug header naming the capability a denied caller lacked
pub const HEADER_REQUESTED_ROLE: &str = "RequestedRole";
/// Debug header reporting `HIT` or `MISS`
pub const HEADER_CACHE: &str = "Cache";

/// Error message of the `404` envelope
pub const NO_MATCH_MESSAGE: &str = "No service matched the request.";
/// Error message of the `429` envelope
pub const RATE_LIMITED_MESSAGE: &str = "Rate control limit reached.";
/// Error message of the `403` envelope
pub const ACCESS_DENIED_MESSAGE: &str = "You don't have the required access level.";
/// Generic error message for unexpected handler failures
pub const UNEXPECTED_FAILURE_MESSAGE: &str = "There has been an error processing the request.";

/// Single-call dispatch pipeline.
///
/// Holds the shared collaborators and runs every call through the same fixed sequence
/// of stages. The pipeline keeps no per-call state, so one instance can be shared by any
/// number of threads (`Pipeline` is `Send + Sync`).
pub struct Pipeline {
    rate_limiter: Arc<dyn RateLimiter>,
    access: Arc<dyn AccessController>,
    cache: Arc<dyn ResultCache>,
    invoker: Invoker,
    metrics: Arc<DispatchMetrics>,
}

impl Pipeline {
    /// Start building a pipeline with pass-through guards, no cache and direct invocation.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Build a pipeline from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownMiddleware`] when the configured middleware is not in
    /// `registry`.
    pub fn from_config(
        config: &GatewayConfig,
        registry: &MiddlewareRegistry,
    ) -> Result<Self, ConfigError> {
        Ok(PipelineBuilder::from_config(config, registry)?.build())
    }

    /// Dispatch counters shared with this pipeline
    #[must_use]
    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Name of the active invocation middleware, if any
    #[must_use]
    pub fn middleware_name(&self) -> Option<&str> {
        self.invoker.middleware_name()
    }

    /// Run one call through the pipeline.
    ///
    /// Stages run in a fixed order and each one can end the call:
    ///
    /// 1. no resolved method: `404`
    /// 2. rate check: `429`
    /// 3. access check: `403` with a `RequestedRole` debug header
    /// 4. cache lookup (only when the method's `cache_ttl > 0`): cached payload, `Cache: HIT`
    /// 5. invocation: payload and `Cache: MISS`, or a classified failure
    ///
    /// The `Class`, `ClassVersion` and `Method` debug headers are attached before the
    /// first stage, so they are present on every envelope.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] when the rate limiter, the access controller or the
    /// result cache fails. Denials and handler failures are never errors; they are
    /// rendered into the envelope.
    pub fn dispatch(&self, ctx: RequestContext) -> Result<ResponseEnvelope, DispatchError> {
        let started = Instant::now();
        let mut envelope = ResponseEnvelope::new(ctx.environment);
        let result = self.run(&ctx, &mut envelope);
        let latency = started.elapsed();

        match result {
            Ok(outcome) => {
                self.metrics.record(outcome, latency);
                info!(
                    call_id = %ctx.call_id,
                    class = %ctx.class_name,
                    method = ctx.method_name().unwrap_or("-"),
                    outcome = outcome.as_str(),
                    status = envelope.status(),
                    latency_us = micros(latency),
                    "Dispatch complete"
                );
                Ok(envelope)
            }
            Err(e) => {
                self.metrics.record(Outcome::Fatal, latency);
                error!(
                    call_id = %ctx.call_id,
                    class = %ctx.class_name,
                    method = ctx.method_name().unwrap_or("-"),
                    stage = e.stage(),
                    error = %e,
                    "Dispatch aborted"
                );
                Err(e)
            }
        }
    }

    fn run(
        &self,
        ctx: &RequestContext,
        envelope: &mut ResponseEnvelope,
    ) -> Result<Outcome, DispatchError> {
        envelope.attach_debug_header(HEADER_CLASS, ctx.class_name.as_str());
        envelope.attach_debug_header(HEADER_CLASS_VERSION, ctx.version.as_str());
        envelope.attach_debug_header(
            HEADER_METHOD,
            ctx.http_method.as_str().to_ascii_uppercase(),
        );

        // S1: match
        let Some(call) = ctx.call() else {
            info!(call_id = %ctx.call_id, class = %ctx.class_name, "No service matched");
            deny(envelope, 404, NO_MATCH_MESSAGE);
            return Ok(Outcome::NotFound);
        };
        let meta = &call.metadata;

        // S2: rate control
        let decision = self
            .rate_limiter
            .check_limit(&ctx.caller, meta)
            .map_err(DispatchError::RateControl)?;
        if let Some(quota) = decision.quota {
            envelope.set_header("X-RateLimit-Limit", quota.limit.to_string());
            envelope.set_header("X-RateLimit-Remaining", quota.remaining.to_string());
            envelope.set_header("X-RateLimit-Reset", quota.reset_secs.to_string());
        }
        if !decision.allowed {
            info!(call_id = %ctx.call_id, caller = %ctx.caller, "Rate control limit reached");
            deny(envelope, 429, RATE_LIMITED_MESSAGE);
            return Ok(Outcome::RateLimited);
        }

        // S3: access control
        let granted = self
            .access
            .has_access(&ctx.caller, meta)
            .map_err(DispatchError::AccessControl)?;
        if !granted {
            info!(
                call_id = %ctx.call_id,
                caller = %ctx.caller,
                role = %meta.role,
                "Access denied"
            );
            deny(envelope, 403, ACCESS_DENIED_MESSAGE);
            envelope.attach_debug_header(HEADER_REQUESTED_ROLE, meta.role.as_str());
            return Ok(Outcome::AccessDenied);
        }

        // S4: cache lookup
        let fingerprint = meta
            .is_cacheable()
            .then(|| Fingerprint::of(&ctx.class_name, call));
        if let Some(fp) = &fingerprint {
            let cached = self.cache.get(fp).map_err(DispatchError::CacheRead)?;
            if let Some(payload) = cached {
                debug!(call_id = %ctx.call_id, fingerprint = %fp, "Cache hit");
                envelope.set_status(meta.status.success, meta.status.success_message.as_deref());
                envelope.set_payload(payload);
                envelope.attach_debug_header(HEADER_CACHE, "HIT");
                return Ok(Outcome::CacheHit);
            }
        }

        // S5: invoke
        match self.invoker.invoke(ctx, call) {
            InvocationOutcome::Success(payload) => {
                self.store(envelope, call, fingerprint.as_ref(), payload)?;
                Ok(Outcome::CacheMiss)
            }
            InvocationOutcome::DomainFailure(err) => {
                warn!(
                    call_id = %ctx.call_id,
                    method = call.target.method_name(),
                    error = %err,
                    "Handler reported a domain failure"
                );
                render_domain_failure(envelope, call, err);
                Ok(Outcome::DomainFailure)
            }
            InvocationOutcome::UnexpectedFailure(failure) => {
                warn!(
                    call_id = %ctx.call_id,
                    method = call.target.method_name(),
                    error = %failure.message,
                    file = %failure.origin.file,
                    line = failure.origin.line,
                    "Handler failed unexpectedly"
                );
                render_unexpected_failure(envelope, call, failure);
                Ok(Outcome::UnexpectedFailure)
            }
        }
    }

    fn store(
        &self,
        envelope: &mut ResponseEnvelope,
        call: &ResolvedCall,
        fingerprint: Option<&Fingerprint>,
        payload: Value,
    ) -> Result<(), DispatchError> {
        let status = &call.metadata.status;
        envelope.set_status(status.success, status.success_message.as_deref());
        envelope.attach_debug_header(HEADER_CACHE, "MISS");

        if let Some(fp) = fingerprint {
            let ttl = call.metadata.cache_ttl;
            envelope.set_expires_in(ttl);
            self.cache
                .put(fp, &payload, ttl)
                .map_err(DispatchError::CacheWrite)?;
        }
        envelope.set_payload(payload);
        Ok(())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("invoker", &self.invoker)
            .field("dispatched", &self.metrics.dispatched())
            .finish_non_exhaustive()
    }
}

fn deny(envelope: &mut ResponseEnvelope, status: u16, message: &str) {
    envelope.set_status(status, None);
    envelope.set_error(ErrorDescriptor::new(message));
}

fn render_domain_failure(envelope: &mut ResponseEnvelope, call: &ResolvedCall, err: DomainError) {
    let policy = &call.metadata.status;
    envelope.set_status(err.status.unwrap_or(policy.error), policy.error_message.as_deref());
    envelope.add_debug_message(DebugRecord::from(&err.origin));
    envelope.set_error(ErrorDescriptor {
        message: err.message,
        description: err.description,
        code: err.code,
        sub_errors: err.errors,
    });
}

fn render_unexpected_failure(
    envelope: &mut ResponseEnvelope,
    call: &ResolvedCall,
    failure: UnexpectedFailure,
) {
    let policy = &call.metadata.status;
    envelope.set_status(policy.error, policy.error_message.as_deref());
    envelope.set_error(ErrorDescriptor::new(UNEXPECTED_FAILURE_MESSAGE));
    if envelope.environment().is_development() {
        envelope.add_error_message(failure.message);
        envelope.add_debug_message(DebugRecord::from(&failure.origin));
    }
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Assembles a [`Pipeline`] from its collaborators.
///
/// Unset collaborators default to [`Unlimited`], [`AllowAll`], [`NoopResultCache`] and
/// direct invocation.
pub struct PipelineBuilder {
    rate_limiter: Arc<dyn RateLimiter>,
    access: Arc<dyn AccessController>,
    cache: Arc<dyn ResultCache>,
    invoker: Invoker,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            rate_limiter: Arc::new(Unlimited),
            access: Arc::new(AllowAll),
            cache: Arc::new(NoopResultCache),
            invoker: Invoker::direct(),
            metrics: None,
        }
    }
}

impl PipelineBuilder {
    /// Builder with collaborators derived from `config`.
    ///
    /// - `rate_control.limit == 0` leaves rate control off
    /// - an empty `access.grants` table still enforces roles (every non-public method
    ///   is denied)
    /// - `cache.enabled == false` installs a no-op cache
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownMiddleware`] when `config.middleware` names a
    /// middleware that is not registered.
    pub fn from_config(
        config: &GatewayConfig,
        registry: &MiddlewareRegistry,
    ) -> Result<Self, ConfigError> {
        let mut builder = Self::default();

        let rc = &config.rate_control;
        if rc.limit > 0 {
            builder = builder.rate_limiter(Arc::new(WindowedRateLimiter::new(
                rc.limit,
                Duration::from_secs(rc.interval_secs),
                Duration::from_secs(rc.penalty_secs),
            )));
        }

        let store = StaticCapabilityStore::new(config.access.grants.clone());
        builder = builder.access_controller(Arc::new(
            RoleAccessController::new(Arc::new(store))
                .with_hierarchy(config.access.hierarchy.clone()),
        ));

        if config.cache.enabled {
            builder = builder.cache(Arc::new(MemoryResultCache::new(config.cache.capacity)));
        }

        if let Some(name) = config.middleware.as_deref() {
            let middleware = registry
                .get(name)
                .ok_or_else(|| ConfigError::UnknownMiddleware {
                    name: name.to_string(),
                    registered: registry.names(),
                })?;
            info!(middleware = name, "Invocation middleware resolved");
            builder = builder.invoker(Invoker::with_middleware(middleware));
        }

        Ok(builder)
    }

    #[must_use]
    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    #[must_use]
    pub fn access_controller(mut self, access: Arc<dyn AccessController>) -> Self {
        self.access = access;
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn invoker(mut self, invoker: Invoker) -> Self {
        self.invoker = invoker;
        self
    }

    /// Share an existing metrics sink instead of creating a fresh one.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            rate_limiter: self.rate_limiter,
            access: self.access,
            cache: self.cache,
            invoker: self.invoker,
            metrics: self.metrics.unwrap_or_default(),
        }
    }
}
