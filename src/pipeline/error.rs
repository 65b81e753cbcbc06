use std::fmt;

/// Pipeline-fatal failure.
///
/// Raised when a collaborator the pipeline depends on (rate limiter, access controller,
/// result cache) fails, as opposed to a handler failing. These conditions are never
/// folded into an envelope: the transport must answer with an infrastructure-level
/// error instead.
#[derive(Debug)]
pub enum DispatchError {
    /// The rate limiter could not reach a decision
    RateControl(anyhow::Error),
    /// The access controller could not reach a decision
    AccessControl(anyhow::Error),
    /// Reading from the result cache failed (not a miss)
    CacheRead(anyhow::Error),
    /// Storing a successful result in the cache failed
    CacheWrite(anyhow::Error),
}

impl DispatchError {
    /// Short stage label used in logs and metrics
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            DispatchError::RateControl(_) => "rate_control",
            DispatchError::AccessControl(_) => "access_control",
            DispatchError::CacheRead(_) => "cache_read",
            DispatchError::CacheWrite(_) => "cache_write",
        }
    }

    fn inner(&self) -> &anyhow::Error {
        match self {
            DispatchError::RateControl(e)
            | DispatchError::AccessControl(e)
            | DispatchError::CacheRead(e)
            | DispatchError::CacheWrite(e) => e,
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::RateControl(e) => write!(f, "Rate control verification failed. {e:#}"),
            DispatchError::AccessControl(e) => {
                write!(f, "Access role verification failed. {e:#}")
            }
            DispatchError::CacheRead(e) => write!(f, "Reading result from cache failed. {e:#}"),
            DispatchError::CacheWrite(e) => write!(f, "Writing result to cache failed. {e:#}"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner().as_ref())
    }
}
