//! # Pipeline Module
//!
//! The pipeline is the orchestrator of a single dispatch. It takes a
//! [`RequestContext`](crate::context::RequestContext), runs the guards, the cache and the
//! invoker in a fixed order, and produces a
//! [`ResponseEnvelope`](crate::envelope::ResponseEnvelope).
//!
//! ## Request Flow
//!
//! ```text
//! RequestContext
//!   -> fixed debug headers (Class, ClassVersion, Method)
//!   -> no method resolved?        404  "No service matched the request."
//!   -> RateLimiter denies?        429  "Rate control limit reached."
//!   -> AccessController denies?   403  "You don't have the required access level."
//!   -> ResultCache hit?           success status, cached payload, Cache: HIT
//!   -> Invoker
//!        Success                  success status, payload, Cache: MISS, cache put
//!        DomainFailure            domain status (or method error status), descriptor
//!        UnexpectedFailure        method error status, generic message
//! ```
//!
//! Guard order is never changed. A rate-limited or unauthorized caller never reaches the
//! cache or the handler.
//!
//! ## Fatal errors
//!
//! Collaborator failures are returned as [`DispatchError`] and never rendered into an
//! envelope. The transport is expected to answer those with a generic 5xx.
//!
//! ## Example
//!
//! ```rust
//! use brrtgate::context::*;
//! use brrtgate::pipeline::Pipeline;
//! use serde_json::json;
//!
//! let pipeline = Pipeline::builder().build();
//! let call = ResolvedCall::new(
//!     CallTarget::new("ping", |_: &Arguments| Ok(json!("pong"))),
//!     MethodMetadata::new("1.0"),
//! );
//! let ctx = RequestContext::resolved("Health", http::Method::GET, CallerIdentity::anonymous(), call);
//!
//! let envelope = pipeline.dispatch(ctx).unwrap();
//! assert_eq!(envelope.status(), 200);
//! assert_eq!(envelope.payload(), Some(&json!("pong")));
//! assert_eq!(envelope.debug_header("Cache"), Some("MISS"));
//! ```

mod core;
mod error;
mod metrics;

pub use core::{
    Pipeline, PipelineBuilder, ACCESS_DENIED_MESSAGE, HEADER_CACHE, HEADER_CLASS,
    HEADER_CLASS_VERSION, HEADER_METHOD, HEADER_REQUESTED_ROLE, NO_MATCH_MESSAGE,
    RATE_LIMITED_MESSAGE, UNEXPECTED_FAILURE_MESSAGE,
};
pub use error::DispatchError;
pub use metrics::{DispatchMetrics, MetricsSnapshot, Outcome};
