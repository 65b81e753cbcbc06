//! # brrtgate
//!
//! **brrtgate** is the single-call dispatch core of an API gateway. A router resolves an
//! inbound call to a service class, method and version; brrtgate decides whether the
//! call may run, runs it (or serves it from cache) and turns the outcome into a uniform
//! [`ResponseEnvelope`].
//!
//! ## Overview
//!
//! Every call goes through the same fixed sequence of stages, each of which can end it:
//!
//! 1. **Match** - no resolved method means `404`
//! 2. **Rate control** - [`RateLimiter`](guards::RateLimiter) denial means `429`
//! 3. **Access control** - [`AccessController`](guards::AccessController) denial means `403`
//! 4. **Cache lookup** - a stored result is served with `Cache: HIT`
//! 5. **Invocation** - the bound handler, or the configured
//!    [`InvocationMiddleware`](invoker::InvocationMiddleware), produces the payload
//!
//! Handler failures come in two kinds with different disclosure rules. A
//! [`DomainError`] is business detail the handler chose to surface and is rendered in
//! full. Anything else is an [`UnexpectedFailure`](failure::UnexpectedFailure) and is
//! rendered with a generic message, unless the call runs in
//! [`Environment::Development`].
//!
//! Failures of the collaborators themselves (rate limiter, access controller, cache)
//! are not rendered at all: [`Pipeline::dispatch`] returns a [`DispatchError`].
//!
//! ## Architecture
//!
//! - **[`context`]** - the immutable per-call input and the handler bound to it
//! - **[`guards`]** - rate and access control contracts plus in-memory implementations
//! - **[`cache`]** - result cache contract, fingerprints and an LRU store with expiry
//! - **[`invoker`]** - direct or middleware invocation, classified into an outcome
//! - **[`failure`]** - domain and unexpected failures with origin and trace capture
//! - **[`envelope`]** - the response envelope and its wire rendering
//! - **[`pipeline`]** - the orchestrator, fatal errors and dispatch metrics
//! - **[`config`]** - YAML configuration with `BRRTG_*` overrides
//! - **[`logging`]** - `tracing-subscriber` setup
//! - **[`cli`]** - the `brrtgate` command line
//!
//! ## Quick Start
//!
//! ```rust
//! use brrtgate::context::*;
//! use brrtgate::guards::{RoleAccessController, StaticCapabilityStore};
//! use brrtgate::cache::MemoryResultCache;
//! use brrtgate::Pipeline;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let store = StaticCapabilityStore::default().grant("alice", "orders.read");
//! let pipeline = Pipeline::builder()
//!     .access_controller(Arc::new(RoleAccessController::new(Arc::new(store))))
//!     .cache(Arc::new(MemoryResultCache::new(1024)))
//!     .build();
//!
//! let call = || {
//!     ResolvedCall::new(
//!         CallTarget::new("list", |args: &Arguments| Ok(json!({ "page": args.get("page") })))
//!             .with_arguments(Arguments::new().named("page", 1)),
//!         MethodMetadata::new("1.0").role("orders.read").cache_ttl(30),
//!     )
//! };
//! let ctx = |caller: &str| {
//!     RequestContext::resolved("Orders", http::Method::GET, CallerIdentity::new(caller), call())
//! };
//!
//! let first = pipeline.dispatch(ctx("alice")).unwrap();
//! assert_eq!(first.debug_header("Cache"), Some("MISS"));
//! let second = pipeline.dispatch(ctx("alice")).unwrap();
//! assert_eq!(second.debug_header("Cache"), Some("HIT"));
//!
//! let denied = pipeline.dispatch(ctx("mallory")).unwrap();
//! assert_eq!(denied.status(), 403);
//! assert_eq!(denied.debug_header("RequestedRole"), Some("orders.read"));
//! ```
//!
//! ## Concurrency
//!
//! A [`Pipeline`] holds no per-call state and is shared across threads as is. Shared
//! state lives only in the collaborators, which synchronize internally. Concurrent
//! misses on the same fingerprint may each run the handler; the last cache write wins.

pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod echo;
pub mod envelope;
pub mod failure;
pub mod guards;
pub mod invoker;
pub mod logging;
pub mod pipeline;

pub use config::{ConfigError, GatewayConfig};
pub use context::{Environment, RequestContext};
pub use envelope::ResponseEnvelope;
pub use failure::{DomainError, HandlerFailure};
pub use pipeline::{DispatchError, Pipeline};
