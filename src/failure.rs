//! # Handler Failures
//!
//! Handlers and middleware report failure as a value rather than by unwinding. Two kinds
//! exist and are rendered differently by the pipeline:
//!
//! - [`DomainError`]: an intentional business error. It carries its own HTTP status,
//!   message, description, code and sub-errors, all of which are shown to the caller.
//! - [`UnexpectedFailure`]: anything else. Production envelopes only get a generic message.
//!   The raw message and the origin are disclosed in development only.
//!
//! Both record a [`FailureOrigin`] (file, line and trace) at the point of construction.
//!
//! ```rust
//! use brrtgate::failure::{DomainError, HandlerFailure};
//!
//! fn validate(name: &str) -> Result<(), HandlerFailure> {
//!     if name.is_empty() {
//!         return Err(DomainError::new("Invalid input")
//!             .status(422)
//!             .code("E1")
//!             .error("name must not be empty")
//!             .into());
//!     }
//!     Ok(())
//! }
//! # assert!(validate("").is_err());
//! ```

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::Location;

/// Where a failure was raised, and the frames leading to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureOrigin {
    pub file: String,
    pub line: u32,
    /// One entry per frame; never empty
    pub trace: Vec<String>,
}

impl FailureOrigin {
    /// Capture the caller's location and the current backtrace.
    ///
    /// The backtrace honours `RUST_BACKTRACE`/`RUST_LIB_BACKTRACE`; when capture is
    /// disabled the trace is the single origin frame.
    #[track_caller]
    #[must_use]
    pub fn capture() -> Self {
        let location = Location::caller();
        Self::with_backtrace(location, &Backtrace::capture())
    }

    fn with_backtrace(location: &Location<'_>, backtrace: &Backtrace) -> Self {
        let origin_frame = format!("{}:{}", location.file(), location.line());
        let mut trace = match backtrace.status() {
            BacktraceStatus::Captured => backtrace
                .to_string()
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        if trace.is_empty() {
            trace.push(origin_frame);
        }
        Self {
            file: location.file().to_string(),
            line: location.line(),
            trace,
        }
    }
}

/// Structured business error raised on purpose by handler logic.
#[derive(Debug, Clone)]
pub struct DomainError {
    /// HTTP status to answer with; the method's error status applies when absent
    pub status: Option<u16>,
    pub message: String,
    pub description: Option<String>,
    pub code: Option<String>,
    /// Additional user-facing error lines
    pub errors: Vec<String>,
    pub origin: FailureOrigin,
}

impl DomainError {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            description: None,
            code: None,
            errors: Vec::new(),
            origin: FailureOrigin::capture(),
        }
    }

    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

/// Any failure a handler did not classify as a domain error.
#[derive(Debug)]
pub struct UnexpectedFailure {
    /// Raw failure message; only ever disclosed in development
    pub message: String,
    pub origin: FailureOrigin,
}

impl UnexpectedFailure {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: FailureOrigin::capture(),
        }
    }

    /// Wrap an error, keeping its full context chain as the message and its backtrace
    /// when one was captured.
    #[track_caller]
    #[must_use]
    pub fn from_error(err: &anyhow::Error) -> Self {
        let location = Location::caller();
        Self {
            message: format!("{err:#}"),
            origin: FailureOrigin::with_backtrace(location, err.backtrace()),
        }
    }

    /// Classify a caught panic payload.
    #[track_caller]
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(format!("handler panicked: {detail}"))
    }
}

impl fmt::Display for UnexpectedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Failure returned by a handler or an invocation middleware.
#[derive(Debug)]
pub enum HandlerFailure {
    Domain(DomainError),
    Unexpected(UnexpectedFailure),
}

impl HandlerFailure {
    #[must_use]
    pub fn is_domain(&self) -> bool {
        matches!(self, HandlerFailure::Domain(_))
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerFailure::Domain(e) => write!(f, "domain failure: {e}"),
            HandlerFailure::Unexpected(e) => write!(f, "unexpected failure: {e}"),
        }
    }
}

impl From<DomainError> for HandlerFailure {
    fn from(err: DomainError) -> Self {
        HandlerFailure::Domain(err)
    }
}

impl From<UnexpectedFailure> for HandlerFailure {
    fn from(err: UnexpectedFailure) -> Self {
        HandlerFailure::Unexpected(err)
    }
}

/// Lets handlers use `?` on `anyhow::Result`.
impl From<anyhow::Error> for HandlerFailure {
    #[track_caller]
    fn from(err: anyhow::Error) -> Self {
        HandlerFailure::Unexpected(UnexpectedFailure::from_error(&err))
    }
}
