//! Error types for capability invocation.

use thiserror::Error;

/// Result type alias using the capability error type.
pub type Result<T> = std::result::Result<T, CapabilityError>;

/// Error type for capability invocations.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The invocation exceeded its ceiling. Agent invocations are
    /// long-running, so this fires only after a generous wait.
    #[error("capability '{capability}' timed out after {seconds}s")]
    Timeout { capability: String, seconds: u64 },

    /// The capability endpoint could not be reached or refused the call.
    #[error("capability '{capability}' unavailable: {message}")]
    Unavailable { capability: String, message: String },

    /// The capability responded, but the response could not be interpreted.
    #[error("invalid response from capability '{capability}': {message}")]
    InvalidResponse { capability: String, message: String },

    /// The invocation was cancelled by the caller.
    #[error("invocation of capability '{capability}' cancelled")]
    Cancelled { capability: String },
}

impl CapabilityError {
    pub fn timeout(capability: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            capability: capability.into(),
            seconds,
        }
    }

    pub fn unavailable(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            capability: capability.into(),
            message: message.into(),
        }
    }

    pub fn invalid_response(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            capability: capability.into(),
            message: message.into(),
        }
    }

    pub fn cancelled(capability: impl Into<String>) -> Self {
        Self::Cancelled {
            capability: capability.into(),
        }
    }

    /// True if this was caller-initiated cancellation rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns true if this error is retryable.
    ///
    /// Only unavailability is transient; timeouts already waited out the
    /// ceiling and invalid responses will not improve on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Map a transport error onto the capability taxonomy.
pub(crate) fn from_reqwest(capability: &str, err: reqwest::Error) -> CapabilityError {
    if err.is_timeout() {
        CapabilityError::unavailable(capability, format!("request timed out: {}", err))
    } else if err.is_connect() {
        CapabilityError::unavailable(capability, format!("connection failed: {}", err))
    } else {
        CapabilityError::unavailable(capability, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(CapabilityError::unavailable("a", "down").is_retryable());
        assert!(!CapabilityError::timeout("a", 900).is_retryable());
        assert!(!CapabilityError::invalid_response("a", "bad json").is_retryable());
        assert!(!CapabilityError::cancelled("a").is_retryable());
    }

    #[test]
    fn test_cancelled_predicate() {
        assert!(CapabilityError::cancelled("a").is_cancelled());
        assert!(!CapabilityError::timeout("a", 1).is_cancelled());
    }
}
