//! Error Types

use thiserror::Error;

/// Result type alias for market operations
pub type Result<T> = std::result::Result<T, MarketError>;

/// Error taxonomy shared by every market.dev crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// Bad input: invalid cadence, missing required field, illegal transition
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown entity id
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Actor is missing or does not own the resource
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Payment processor, auth provider or store failure
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Uniqueness violation, e.g. a ledger row for an already-applied event
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl MarketError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    /// Machine-readable kind surfaced to API callers
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Authorization(_) => "authorization_error",
            Self::ExternalService(_) => "external_service_error",
            Self::Conflict(_) => "conflict",
        }
    }

    /// Only external failures are worth another attempt, and only for reads
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalService(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::NotFound { entity, .. } => format!("The requested {entity} does not exist."),
            Self::Authorization(_) => "You are not allowed to perform this action.".into(),
            Self::ExternalService(_) => {
                "A payment or upstream service is unavailable. Please try again.".into()
            }
            Self::Conflict(_) => "This request was already processed.".into(),
        }
    }
}
