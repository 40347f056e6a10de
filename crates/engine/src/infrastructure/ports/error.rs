//! Error types for port operations.

/// Repository operation errors with context for debugging.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Entity not found - includes entity type and ID for actionable error messages.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Database operation failed - includes operation name for tracing.
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// Serialization/deserialization of a stored document failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepoError {
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Failure of a single model call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("model request timed out: {0}")]
    Timeout(String),
    #[error("model rate limited: {0}")]
    RateLimited(String),
    #[error("model server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("model credentials rejected: {0}")]
    Unauthorized(String),
    #[error("model rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("model request failed: {0}")]
    RequestFailed(String),
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Classify a non-success HTTP status from the model API.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Unauthorized(message),
            408 => Self::Timeout(message),
            429 => Self::RateLimited(message),
            500..=599 => Self::Server { status, message },
            _ => Self::Rejected { status, message },
        }
    }

    /// Failures that say nothing about the request itself; another model may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::RateLimited(_)
                | Self::Server { .. }
                | Self::RequestFailed(_)
                | Self::InvalidResponse(_)
        )
    }

    /// The credentials themselves were refused.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_classified() {
        assert!(LlmError::from_status(401, "bad key").is_auth());
        assert!(LlmError::from_status(403, "forbidden").is_auth());
        assert!(LlmError::from_status(429, "slow down").is_transient());
        assert!(LlmError::from_status(503, "overloaded").is_transient());
        assert!(LlmError::from_status(408, "timeout").is_transient());

        let unknown_model = LlmError::from_status(404, "no such model");
        assert!(!unknown_model.is_transient());
        assert!(!unknown_model.is_auth());
    }
}
