use std::fmt;

use crate::store::StoreError;

// ============================================================================
// Routing Errors
// ============================================================================

/// Configuration errors raised while building the handler registry.
/// These are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("Invalid topic pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl RoutingError {
    pub(crate) fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by a single handler invocation
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Failed to deserialize message body: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Persistence failure: {0}")]
    Store(#[from] StoreError),

    #[error("Handler rejected message: {0}")]
    Rejected(String),
}

/// One failed handler within a dispatch
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: String,
    pub pattern: String,
    pub error: HandlerError,
}

/// Aggregate failure of a dispatch: at least one matched handler failed.
/// Failures are kept in invocation order.
#[derive(Debug)]
pub struct DispatchError {
    pub routing_key: String,
    pub invoked: usize,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchError {
    pub fn first(&self) -> Option<&HandlerFailure> {
        self.failures.first()
    }

    pub fn failed_handlers(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.handler.as_str())
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} handler(s) failed for routing key `{}`",
            self.failures.len(),
            self.invoked,
            self.routing_key
        )?;
        if let Some(first) = self.first() {
            write!(f, "; first: {} ({})", first.handler, first.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.first().map(|f| &f.error as &(dyn std::error::Error + 'static))
    }
}
