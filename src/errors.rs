use sea_orm::error::DbErr;
use serde::Serialize;

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// True for infrastructure failures where the caller should replay the
    /// whole event. Malformed events are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => true,
            Self::NotFound(_)
            | Self::ValidationError(_)
            | Self::InvalidStatus(_)
            | Self::SerializationError(_) => false,
        }
    }

    /// Short machine-readable code, used as a log field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidStatus(_) => "invalid_status",
            Self::EventError(_) => "event_error",
            Self::InternalError(_) => "internal_error",
            Self::SerializationError(_) => "serialization_error",
            Self::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failures_are_not_retryable() {
        assert!(!ServiceError::ValidationError("empty items".into()).is_retryable());
        assert!(!ServiceError::InvalidStatus("pending".into()).is_retryable());
        assert!(ServiceError::db_error("connection reset").is_retryable());
        assert!(ServiceError::EventError("channel closed".into()).is_retryable());
    }

    #[test]
    fn db_error_normalizes_string_input() {
        let err = ServiceError::db_error("boom");
        assert!(matches!(err, ServiceError::DatabaseError(DbErr::Custom(ref msg)) if msg == "boom"));
        assert_eq!(err.code(), "database_error");
    }

    #[test]
    fn display_includes_message() {
        assert_eq!(
            ServiceError::NotFound("variance event".into()).to_string(),
            "Not found: variance event"
        );
        assert_eq!(
            ServiceError::ValidationError("duplicate product".into()).to_string(),
            "Validation error: duplicate product"
        );
    }

    #[test]
    fn json_errors_map_to_serialization_error() {
        let err: ServiceError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "serialization_error");
        assert!(!err.is_retryable());
    }
}
