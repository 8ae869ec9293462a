use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Error taxonomy of the credit engine.
///
/// Policy rejections are not errors: they are returned as a negative
/// [`EligibilityDecision`](crate::eligibility::EligibilityDecision).
#[derive(Debug)]
pub enum EngineError {
    /// Malformed or out-of-range input.
    Validation(String),
    /// Unknown customer or loan.
    NotFound(String),
    /// The per-customer exclusion or the debt compare-and-set could not be obtained.
    /// Retrying the whole call is safe.
    ConcurrencyConflict(String),
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Internal error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<EngineError>,
        /// Additional context message.
        context: String,
    },
}

impl EngineError {
    /// The innermost error, skipping any context wrappers.
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), EngineError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.root(), EngineError::Validation(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), EngineError::ConcurrencyConflict(_))
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "Validation error: {}", msg),
            EngineError::NotFound(msg) => write!(f, "Not found: {}", msg),
            EngineError::ConcurrencyConflict(msg) => write!(f, "Concurrency conflict: {}", msg),
            EngineError::DatabaseError(e) => write!(f, "Database error: {}", e),
            EngineError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            EngineError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::DatabaseError(e) => Some(e),
            EngineError::WithContext { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl IntoResponse for EngineError {
    /// Maps each error variant to an HTTP status code and JSON body.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            EngineError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            EngineError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            EngineError::ConcurrencyConflict(msg) => {
                tracing::warn!("Concurrency conflict: {}", msg);
                (StatusCode::CONFLICT, msg.clone())
            }
            EngineError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            EngineError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            EngineError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                return source.clone().into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl Clone for EngineError {
    /// `sqlx::Error` is not cloneable, so `DatabaseError` keeps only its message.
    fn clone(&self) -> Self {
        match self {
            EngineError::Validation(msg) => EngineError::Validation(msg.clone()),
            EngineError::NotFound(msg) => EngineError::NotFound(msg.clone()),
            EngineError::ConcurrencyConflict(msg) => {
                EngineError::ConcurrencyConflict(msg.clone())
            }
            EngineError::DatabaseError(e) => {
                EngineError::DatabaseError(sqlx::Error::Protocol(e.to_string()))
            }
            EngineError::InternalError(msg) => EngineError::InternalError(msg.clone()),
            EngineError::WithContext { source, context } => EngineError::WithContext {
                source: source.clone(),
                context: context.clone(),
            },
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::DatabaseError(err)
    }
}

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, EngineError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, EngineError> {
    fn context(self, context: impl Into<String>) -> Result<T, EngineError> {
        self.map_err(|e| EngineError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| EngineError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, EngineError> {
        self.map_err(|e| EngineError::WithContext {
            source: Box::new(EngineError::DatabaseError(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| EngineError::WithContext {
            source: Box::new(EngineError::DatabaseError(e)),
            context: f(),
        })
    }
}
