//! # Invoker Module
//!
//! Runs the resolved handler for a call, or hands the call to an
//! [`InvocationMiddleware`] when one is configured, and classifies the result into an
//! [`InvocationOutcome`].
//!
//! ## Middleware as capability substitution
//!
//! A middleware is not a decorator chain. At most one is active per pipeline, and when
//! present it *replaces* direct invocation: it receives the request context and must
//! produce the payload itself (for example by forwarding to a remote service, or by
//! wrapping the handler in a transaction).
//!
//! Middleware is configured by name and resolved through a [`MiddlewareRegistry`] when
//! the pipeline is built. An unknown name is a configuration error at that point, so a
//! misconfigured pipeline never serves a request.
//!
//! ## Panics
//!
//! A handler or middleware that panics does not take the caller down with it. The panic
//! is caught and classified as an unexpected failure.

use crate::context::{RequestContext, ResolvedCall};
use crate::failure::{DomainError, HandlerFailure, UnexpectedFailure};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Replacement for direct handler invocation.
pub trait InvocationMiddleware: Send + Sync {
    /// Name the middleware is registered and logged under
    fn name(&self) -> &str;

    /// Produce the payload for `call`.
    ///
    /// # Errors
    ///
    /// Domain and unexpected failures, exactly as a handler would report them.
    fn get_result(&self, ctx: &RequestContext, call: &ResolvedCall)
        -> Result<Value, HandlerFailure>;
}

/// Classified result of an invocation.
#[derive(Debug)]
pub enum InvocationOutcome {
    Success(Value),
    DomainFailure(DomainError),
    UnexpectedFailure(UnexpectedFailure),
}

impl From<Result<Value, HandlerFailure>> for InvocationOutcome {
    fn from(result: Result<Value, HandlerFailure>) -> Self {
        match result {
            Ok(v) => InvocationOutcome::Success(v),
            Err(HandlerFailure::Domain(e)) => InvocationOutcome::DomainFailure(e),
            Err(HandlerFailure::Unexpected(e)) => InvocationOutcome::UnexpectedFailure(e),
        }
    }
}

/// Executes calls directly or through the configured middleware.
#[derive(Clone, Default)]
pub struct Invoker {
    middleware: Option<Arc<dyn InvocationMiddleware>>,
}

impl Invoker {
    /// Invoker that calls handlers directly.
    #[must_use]
    pub fn direct() -> Self {
        Self { middleware: None }
    }

    /// Invoker that delegates every call to `middleware`.
    #[must_use]
    pub fn with_middleware(middleware: Arc<dyn InvocationMiddleware>) -> Self {
        Self {
            middleware: Some(middleware),
        }
    }

    /// Name of the active middleware, if any
    #[must_use]
    pub fn middleware_name(&self) -> Option<&str> {
        self.middleware.as_deref().map(|mw| mw.name())
    }

    /// Run `call` and classify the result.
    pub fn invoke(&self, ctx: &RequestContext, call: &ResolvedCall) -> InvocationOutcome {
        let result = catch_unwind(AssertUnwindSafe(|| match &self.middleware {
            Some(mw) => mw.get_result(ctx, call),
            None => call.target.call(),
        }));
        match result {
            Ok(r) => r.into(),
            Err(panic) => InvocationOutcome::UnexpectedFailure(UnexpectedFailure::from_panic(
                panic.as_ref(),
            )),
        }
    }
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker")
            .field("middleware", &self.middleware_name())
            .finish()
    }
}

/// Middleware implementations available to configuration, by name.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    entries: BTreeMap<String, Arc<dyn InvocationMiddleware>>,
}

impl MiddlewareRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `middleware` under its own name, replacing a previous registration.
    pub fn register(&mut self, middleware: Arc<dyn InvocationMiddleware>) {
        self.entries
            .insert(middleware.name().to_string(), middleware);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn InvocationMiddleware>> {
        self.entries.get(name).cloned()
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}
