//! Built-in echo handler.
//!
//! Answers with the arguments it was called with. The named argument `fail` turns it
//! into a failing handler, which makes every envelope shape reachable from the CLI:
//!
//! - `fail=domain` reports a `422` domain error with code `ECHO_FAIL`
//! - `fail=unexpected` reports an unexpected failure
//! - `fail=panic` panics inside the handler

use crate::context::{Arguments, CallTarget, HandlerFn};
use crate::failure::{DomainError, HandlerFailure, UnexpectedFailure};
use serde_json::{json, Value};
use std::sync::Arc;

/// Echo `args` back as `{"method", "positional", "named"}`.
///
/// # Errors
///
/// Fails on request through the `fail` named argument.
pub fn echo(method: &str, args: &Arguments) -> Result<Value, HandlerFailure> {
    match args.get_str("fail") {
        Some("domain") => Err(DomainError::new("Echo rejected the call")
            .status(422)
            .code("ECHO_FAIL")
            .description("The caller asked the echo handler to fail")
            .error("fail=domain")
            .into()),
        Some("unexpected") => Err(UnexpectedFailure::new("echo handler failure requested").into()),
        #[allow(clippy::panic)]
        Some("panic") => panic!("echo handler panic requested"),
        _ => Ok(json!({
            "method": method,
            "positional": args.positional,
            "named": args.named,
        })),
    }
}

/// Shared echo handler for `method`.
#[must_use]
pub fn echo_handler(method: &str) -> HandlerFn {
    let method = method.to_string();
    Arc::new(move |args: &Arguments| echo(&method, args))
}

/// Call target running the echo handler with `arguments` bound.
#[must_use]
pub fn echo_target(method: &str, arguments: Arguments) -> CallTarget {
    CallTarget::from_shared(method, echo_handler(method)).with_arguments(arguments)
}
