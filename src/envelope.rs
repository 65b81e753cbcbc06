//! # Response Envelope
//!
//! [`ResponseEnvelope`] is the single output of a dispatch. It holds either a success
//! payload or an [`ErrorDescriptor`], never both. Alongside the body it carries a status
//! line, debug headers, response headers, development-only debug records and an optional
//! cache directive.
//!
//! The transport layer serializes it. [`ResponseEnvelope::body`] and
//! [`ResponseEnvelope::response_headers`] render the conventional wire shape:
//!
//! ```json
//! { "data": { "...": "..." } }
//! { "errorReport": { "message": "...", "description": null, "code": null, "errors": [] },
//!   "debug": [ { "file": "...", "line": 42, "traces": ["..."] } ] }
//! ```
//!
//! # Invariants
//!
//! - The body is a payload XOR an error (enforced by [`EnvelopeBody`]).
//! - Debug records are dropped unless the envelope was built for
//!   [`Environment::Development`].

use crate::context::Environment;
use crate::failure::FailureOrigin;
use serde::Serialize;
use serde_json::{json, Value};
use smallvec::SmallVec;
use std::sync::Arc;

/// Maximum inline headers before heap allocation
pub const MAX_INLINE_HEADERS: usize = 8;

/// Stack-allocated header storage; names are shared `Arc<str>` constants
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Prefix debug headers get when rendered for the wire
pub const DEBUG_HEADER_PREFIX: &str = "X-Gateway-";

/// How long the transport may let clients cache a successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheDirective {
    pub expires_in_secs: u64,
}

/// Caller-facing description of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ErrorDescriptor {
    pub message: String,
    pub description: Option<String>,
    pub code: Option<String>,
    #[serde(rename = "errors")]
    pub sub_errors: Vec<String>,
}

impl ErrorDescriptor {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Development-only diagnostic: where a failure originated and how it got there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugRecord {
    pub file: String,
    pub line: u32,
    pub traces: Vec<String>,
}

impl From<&FailureOrigin> for DebugRecord {
    fn from(origin: &FailureOrigin) -> Self {
        Self {
            file: origin.file.clone(),
            line: origin.line,
            traces: origin.trace.clone(),
        }
    }
}

/// Payload XOR error descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeBody {
    Payload(Value),
    Error(ErrorDescriptor),
}

/// Accumulated result of one dispatch.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    status: u16,
    status_message: Option<String>,
    body: EnvelopeBody,
    debug_headers: HeaderVec,
    headers: HeaderVec,
    debug_messages: Vec<DebugRecord>,
    cache_directive: Option<CacheDirective>,
    environment: Environment,
}

impl ResponseEnvelope {
    /// Empty `200` envelope with a null payload.
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            status: 200,
            status_message: None,
            body: EnvelopeBody::Payload(Value::Null),
            debug_headers: HeaderVec::new(),
            headers: HeaderVec::new(),
            debug_messages: Vec::new(),
            cache_directive: None,
            environment,
        }
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// Status line reason: the custom message, or the canonical reason for the code.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.status_message.as_deref().unwrap_or_else(|| {
            http::StatusCode::from_u16(self.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("")
        })
    }

    #[must_use]
    pub fn body_kind(&self) -> &EnvelopeBody {
        &self.body
    }

    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match &self.body {
            EnvelopeBody::Payload(v) => Some(v),
            EnvelopeBody::Error(_) => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&ErrorDescriptor> {
        match &self.body {
            EnvelopeBody::Error(e) => Some(e),
            EnvelopeBody::Payload(_) => None,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.body, EnvelopeBody::Error(_))
    }

    /// Get a debug header by name (case-insensitive)
    #[must_use]
    pub fn debug_header(&self, name: &str) -> Option<&str> {
        find_header(&self.debug_headers, name)
    }

    #[must_use]
    pub fn debug_headers(&self) -> &HeaderVec {
        &self.debug_headers
    }

    /// Get a response header by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    #[must_use]
    pub fn debug_messages(&self) -> &[DebugRecord] {
        &self.debug_messages
    }

    #[must_use]
    pub fn cache_directive(&self) -> Option<CacheDirective> {
        self.cache_directive
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub(crate) fn set_status(&mut self, status: u16, message: Option<&str>) {
        self.status = status;
        self.status_message = message.filter(|m| !m.is_empty()).map(str::to_string);
    }

    pub(crate) fn set_payload(&mut self, payload: Value) {
        self.body = EnvelopeBody::Payload(payload);
    }

    pub(crate) fn set_error(&mut self, error: ErrorDescriptor) {
        self.body = EnvelopeBody::Error(error);
    }

    /// Append a line to the error descriptor; ignored on success envelopes.
    pub(crate) fn add_error_message(&mut self, message: impl Into<String>) {
        if let EnvelopeBody::Error(e) = &mut self.body {
            e.sub_errors.push(message.into());
        }
    }

    /// Add or replace a debug header
    pub(crate) fn attach_debug_header(&mut self, name: &str, value: impl Into<String>) {
        upsert_header(&mut self.debug_headers, name, value.into());
    }

    /// Add or replace a response header
    pub(crate) fn set_header(&mut self, name: &str, value: impl Into<String>) {
        upsert_header(&mut self.headers, name, value.into());
    }

    /// Record a diagnostic; dropped outside development.
    pub(crate) fn add_debug_message(&mut self, record: DebugRecord) {
        if self.environment.is_development() {
            self.debug_messages.push(record);
        }
    }

    pub(crate) fn set_expires_in(&mut self, seconds: u64) {
        self.cache_directive = Some(CacheDirective {
            expires_in_secs: seconds,
        });
    }

    /// Render the JSON body the transport should send.
    #[must_use]
    pub fn body(&self) -> Value {
        let mut out = match &self.body {
            EnvelopeBody::Payload(v) => json!({ "data": v }),
            EnvelopeBody::Error(e) => json!({ "errorReport": e }),
        };
        if self.environment.is_development() && !self.debug_messages.is_empty() {
            out["debug"] = json!(self.debug_messages);
        }
        out
    }

    /// Render the headers the transport should send: response headers, then
    /// `Cache-Control` (`max-age` from the cache directive, `no-store` otherwise), then the
    /// debug headers with [`DEBUG_HEADER_PREFIX`].
    #[must_use]
    pub fn response_headers(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        match self.cache_directive {
            Some(d) if !self.is_error() => out.push((
                "Cache-Control".to_string(),
                format!("private, max-age={}", d.expires_in_secs),
            )),
            _ => out.push(("Cache-Control".to_string(), "no-store".to_string())),
        }
        out.extend(
            self.debug_headers
                .iter()
                .map(|(k, v)| (format!("{DEBUG_HEADER_PREFIX}{k}"), v.clone())),
        );
        out
    }
}

fn find_header<'a>(headers: &'a HeaderVec, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn upsert_header(headers: &mut HeaderVec, name: &str, value: String) {
    if let Some(slot) = headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
        slot.1 = value;
    } else {
        headers.push((Arc::from(name), value));
    }
}
