//! Error types for entiorm

use thiserror::Error;

/// Result type alias for entiorm operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for database operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transaction lifecycle error (commit/rollback on a finished transaction)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Query timeout error
    #[error("Query timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Several failures from one operation, in the order they happened.
    ///
    /// Produced when a write fails and the cleanup that follows it
    /// (rollback, savepoint rollback) fails as well.
    #[error("{}", join_messages(.0))]
    Joined(Vec<OrmError>),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

fn join_messages(errors: &[OrmError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl OrmError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a transaction lifecycle error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }

    /// Combine two failures into one error that keeps both causes.
    ///
    /// Nested aggregates are flattened, so `a.join(b).join(c)` yields three causes.
    pub fn join(self, other: OrmError) -> Self {
        let mut errors = self.into_causes();
        errors.extend(other.into_causes());
        Self::Joined(errors)
    }

    /// The root causes of this error, in order. A plain error yields itself.
    pub fn causes(&self) -> Vec<&OrmError> {
        match self {
            Self::Joined(errors) => errors.iter().flat_map(OrmError::causes).collect(),
            other => vec![other],
        }
    }

    fn into_causes(self) -> Vec<OrmError> {
        match self {
            Self::Joined(errors) => errors.into_iter().flat_map(OrmError::into_causes).collect(),
            other => vec![other],
        }
    }

    /// Check if this error aggregates more than one failure
    pub fn is_joined(&self) -> bool {
        matches!(self, Self::Joined(_))
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Parse a tokio_postgres error into a more specific OrmError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::OrmError;

    #[test]
    fn join_keeps_both_causes_in_order() {
        let err = OrmError::Other("update failed".into())
            .join(OrmError::Other("rollback failed".into()));

        let causes: Vec<String> = err.causes().iter().map(|e| e.to_string()).collect();
        assert_eq!(causes, vec!["update failed", "rollback failed"]);
        assert_eq!(err.to_string(), "update failed; rollback failed");
    }

    #[test]
    fn join_flattens_nested_aggregates() {
        let err = OrmError::Other("a".into())
            .join(OrmError::Other("b".into()))
            .join(OrmError::Other("c".into()).join(OrmError::not_found("d")));

        assert_eq!(err.causes().len(), 4);
        assert!(err.causes()[3].is_not_found());
    }

    #[test]
    fn plain_error_is_its_own_cause() {
        let err = OrmError::validation("bad column");
        assert!(!err.is_joined());
        assert_eq!(err.causes().len(), 1);
    }
}
