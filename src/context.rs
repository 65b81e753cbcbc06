//! # Request Context
//!
//! A [`RequestContext`] is the immutable, per-call input to the dispatch pipeline. The
//! (external) router builds one for every inbound call, either carrying a [`ResolvedCall`]
//! or marking the call as unmatched, and hands it to
//! [`Pipeline::dispatch`](crate::pipeline::Pipeline::dispatch). The pipeline reads it and
//! drops it once the envelope is built.
//!
//! Handlers are bound as function values at resolution time ([`CallTarget`]), so the
//! pipeline never looks anything up by name.

use crate::failure::HandlerFailure;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

/// Strongly typed call identifier backed by ULID.
///
/// Used to correlate the log lines of a single dispatch.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct CallId(pub ulid::Ulid);

impl CallId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Reuse an upstream correlation id if it parses, otherwise mint a new one.
    #[must_use]
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .and_then(|s| s.parse::<CallId>().ok())
            .unwrap_or_default()
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CallId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CallId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CallId(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for CallId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CallId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<CallId>()
            .map_err(|_| serde::de::Error::custom("invalid call id"))
    }
}

/// Deployment environment of a call.
///
/// Controls disclosure: only `Development` exposes failure messages, origin locations
/// and traces in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[serde(alias = "prod")]
    Production,
    #[serde(alias = "dev")]
    Development,
}

impl Environment {
    /// Parse an environment name, accepting the short `prod`/`dev` forms.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Some(Environment::Production),
            "development" | "dev" => Some(Environment::Development),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
        }
    }
}

/// Opaque caller identifier handed over by the credential/session subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity used when the transport could not identify the caller.
    #[must_use]
    pub fn anonymous() -> Self {
        Self("anonymous".to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CallerIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Positional and named arguments bound to a call by the router.
///
/// Named arguments are kept sorted so that fingerprints do not depend on the order in
/// which the router extracted them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    pub positional: Vec<Value>,
    pub named: BTreeMap<String, Value>,
}

impl Arguments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Bind a named argument, replacing any previous binding with the same name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    #[inline]
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.named.get(name).and_then(Value::as_str)
    }

    #[inline]
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// Handler bound by the router: receives the call's arguments and produces a payload.
pub type HandlerFn = Arc<dyn Fn(&Arguments) -> Result<Value, HandlerFailure> + Send + Sync>;

/// The resolved handler plus the arguments already bound to it.
#[derive(Clone)]
pub struct CallTarget {
    method_name: String,
    arguments: Arguments,
    handler: HandlerFn,
}

impl CallTarget {
    pub fn new<F>(method_name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arguments) -> Result<Value, HandlerFailure> + Send + Sync + 'static,
    {
        Self {
            method_name: method_name.into(),
            arguments: Arguments::default(),
            handler: Arc::new(handler),
        }
    }

    /// Build a target around an already shared handler.
    pub fn from_shared(method_name: impl Into<String>, handler: HandlerFn) -> Self {
        Self {
            method_name: method_name.into(),
            arguments: Arguments::default(),
            handler,
        }
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }

    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    #[must_use]
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Call the bound handler with the bound arguments.
    pub fn call(&self) -> Result<Value, HandlerFailure> {
        (self.handler)(&self.arguments)
    }
}

impl fmt::Debug for CallTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallTarget")
            .field("method_name", &self.method_name)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

/// Status codes and messages a method answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPolicy {
    /// Status used for fresh and cached successes
    pub success: u16,
    /// Optional custom status line message for successes
    pub success_message: Option<String>,
    /// Status used for unexpected failures, and for domain failures without their own status
    pub error: u16,
    /// Optional custom status line message for failures
    pub error_message: Option<String>,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            success: 200,
            success_message: None,
            error: 500,
            error_message: None,
        }
    }
}

/// Per-method policy resolved by the router.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodMetadata {
    /// Capability (role) required to call the method; empty means public
    pub role: String,
    pub status: StatusPolicy,
    /// Seconds a successful result may be served from cache; 0 disables caching
    pub cache_ttl: u64,
    /// Version identifier of the service the method belongs to
    pub version: String,
    /// Methods flagged exempt are never counted against the caller's rate quota
    pub rate_control_exempt: bool,
}

impl MethodMetadata {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    #[must_use]
    pub fn cache_ttl(mut self, seconds: u64) -> Self {
        self.cache_ttl = seconds;
        self
    }

    #[must_use]
    pub fn status(mut self, status: StatusPolicy) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn rate_control_exempt(mut self, exempt: bool) -> Self {
        self.rate_control_exempt = exempt;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.role.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.cache_ttl > 0
    }
}

/// A method the router managed to resolve: the bound handler and its metadata.
#[derive(Debug, Clone)]
pub struct ResolvedCall {
    pub target: CallTarget,
    pub metadata: MethodMetadata,
}

impl ResolvedCall {
    #[must_use]
    pub fn new(target: CallTarget, metadata: MethodMetadata) -> Self {
        Self { target, metadata }
    }
}

/// Immutable input of a single dispatch.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub call_id: CallId,
    /// Resolved service class name (reported even when no method matched)
    pub class_name: String,
    /// Resolved service version
    pub version: String,
    pub http_method: http::Method,
    pub caller: CallerIdentity,
    pub environment: Environment,
    resolved: Option<ResolvedCall>,
}

impl RequestContext {
    /// Context for a call whose method was resolved.
    pub fn resolved(
        class_name: impl Into<String>,
        http_method: http::Method,
        caller: CallerIdentity,
        call: ResolvedCall,
    ) -> Self {
        Self {
            call_id: CallId::new(),
            class_name: class_name.into(),
            version: call.metadata.version.clone(),
            http_method,
            caller,
            environment: Environment::default(),
            resolved: Some(call),
        }
    }

    /// Context for a call the router could not match to a method.
    pub fn unmatched(
        class_name: impl Into<String>,
        version: impl Into<String>,
        http_method: http::Method,
        caller: CallerIdentity,
    ) -> Self {
        Self {
            call_id: CallId::new(),
            class_name: class_name.into(),
            version: version.into(),
            http_method,
            caller,
            environment: Environment::default(),
            resolved: None,
        }
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_call_id(mut self, call_id: CallId) -> Self {
        self.call_id = call_id;
        self
    }

    /// The resolved call, or `None` when no method matched.
    #[inline]
    #[must_use]
    pub fn call(&self) -> Option<&ResolvedCall> {
        self.resolved.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn metadata(&self) -> Option<&MethodMetadata> {
        self.resolved.as_ref().map(|c| &c.metadata)
    }

    /// Name of the resolved method, if any.
    #[must_use]
    pub fn method_name(&self) -> Option<&str> {
        self.resolved.as_ref().map(|c| c.target.method_name())
    }
}
