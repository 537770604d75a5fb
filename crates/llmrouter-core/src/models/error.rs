//! Error taxonomy: per-attempt classification (C1) plus the subsystem and
//! top-level error enums the rest of the crate returns.

use serde::Serialize;
use thiserror::Error;

/// The classified kind of one failed provider call. Drives retry/switch
/// decisions and whether the circuit breaker is touched at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ClientError,
    RateLimit,
    NotFound,
    RetryableNetwork,
    ProviderNetwork,
    Cancelled,
    Other,
}

/// A classified failure from one provider attempt.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ClassifiedError {
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            status: None,
            message: message.into(),
        }
    }

    /// Classifies an HTTP status code per the rules in the error classifier
    /// design: 404 is terminal for the model, 429 is a retryable rate limit,
    /// other 4xx is the caller's fault, 5xx is an upstream problem.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            404 => ErrorKind::NotFound,
            429 => ErrorKind::RateLimit,
            400..=499 => ErrorKind::ClientError,
            _ => ErrorKind::Other,
        };
        Self {
            kind,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Classifies a low-level network error by its POSIX-style error code.
    pub fn from_network_code(code: &str, message: impl Into<String>) -> Self {
        let kind = match code {
            "ENETUNREACH" | "ECONNRESET" => ErrorKind::RetryableNetwork,
            "ECONNREFUSED" | "EHOSTUNREACH" | "ENOTFOUND" | "ETIMEDOUT" => ErrorKind::ProviderNetwork,
            _ => ErrorKind::Other,
        };
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Other,
            status: None,
            message: message.into(),
        }
    }

    pub fn is_retry_same_model(&self) -> bool {
        matches!(self.kind, ErrorKind::RateLimit | ErrorKind::RetryableNetwork)
    }

    pub fn touches_circuit_breaker(&self) -> bool {
        !matches!(
            self.kind,
            ErrorKind::ClientError | ErrorKind::RateLimit | ErrorKind::Cancelled
        )
    }
}

/// Errors raised while loading or validating the model registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to load catalog from {source_desc}: {reason}")]
    LoadFailed { source_desc: String, reason: String },

    #[error("catalog entry invalid: {0}")]
    InvalidEntry(String),

    #[error("override for unknown model '{0}'")]
    UnknownOverrideTarget(String),

    #[error("override rejected: {0}")]
    OverrideMismatch(String),

    #[error("duplicate model name '{0}' in catalog")]
    DuplicateName(String),
}

/// Errors raised by the selector while resolving a request to a candidate.
#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("no model satisfies the requested capabilities")]
    NoCandidates,

    #[error("requested model '{0}' is not in the catalog")]
    UnknownModel(String),
}

/// Cause of a cancelled request, surfaced distinctly per the design notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelCause {
    Client,
    Shutdown,
}

/// Top-level router error, mapped to HTTP status by the gateway crate.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("capability mismatch: {0}")]
    CapabilityMismatch(String),

    #[error("rate limited")]
    RateLimited,

    #[error("all candidate models failed")]
    AllModelsFailed { errors: Vec<crate::models::routing::AttemptError> },

    #[error("request cancelled ({cause:?})")]
    Cancelled { cause: CancelCause },

    #[error("gateway is shutting down")]
    ShuttingDown,

    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    pub fn http_status(&self) -> u16 {
        match self {
            RouterError::Validation(_) => 400,
            RouterError::CapabilityMismatch(_) => 422,
            RouterError::RateLimited => 429,
            RouterError::AllModelsFailed { .. } => 502,
            RouterError::Cancelled { .. } => 499,
            RouterError::ShuttingDown => 503,
            RouterError::Internal(_) => 500,
        }
    }

    /// Seconds the caller should wait before retrying, when applicable.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            RouterError::ShuttingDown => Some(1),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_404_as_not_found() {
        let e = ClassifiedError::from_status(404, "missing");
        assert_eq!(e.kind, ErrorKind::NotFound);
        assert!(e.touches_circuit_breaker());
    }

    #[test]
    fn classifies_429_as_rate_limit_and_retryable() {
        let e = ClassifiedError::from_status(429, "slow down");
        assert_eq!(e.kind, ErrorKind::RateLimit);
        assert!(e.is_retry_same_model());
        assert!(!e.touches_circuit_breaker());
    }

    #[test]
    fn classifies_other_4xx_as_client_error() {
        let e = ClassifiedError::from_status(400, "bad request");
        assert_eq!(e.kind, ErrorKind::ClientError);
        assert!(!e.touches_circuit_breaker());
    }

    #[test]
    fn classifies_5xx_as_other() {
        let e = ClassifiedError::from_status(503, "unavailable");
        assert_eq!(e.kind, ErrorKind::Other);
        assert!(e.touches_circuit_breaker());
    }

    #[test]
    fn classifies_network_codes() {
        assert_eq!(
            ClassifiedError::from_network_code("ECONNRESET", "x").kind,
            ErrorKind::RetryableNetwork
        );
        assert_eq!(
            ClassifiedError::from_network_code("ETIMEDOUT", "x").kind,
            ErrorKind::ProviderNetwork
        );
    }

    #[test]
    fn router_error_status_mapping() {
        assert_eq!(RouterError::RateLimited.http_status(), 429);
        assert_eq!(
            RouterError::Cancelled { cause: CancelCause::Client }.http_status(),
            499
        );
        assert_eq!(RouterError::ShuttingDown.http_status(), 503);
        assert_eq!(RouterError::ShuttingDown.retry_after_secs(), Some(1));
        assert_eq!(RouterError::RateLimited.retry_after_secs(), None);
    }
}
