//! Error types for pgresource

use thiserror::Error;

pub type ResourceResult<T> = Result<T, ResourceError>;

/// SQLSTATE `undefined_column`.
const UNDEFINED_COLUMN: &str = "42703";
/// SQLSTATE `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

#[derive(Debug, Error)]
pub enum ResourceError {
    /// The database URL could not be parsed or the server was unreachable.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A statement failed; displays the server's own message.
    #[error("{}", db_message(.0))]
    Query(#[from] tokio_postgres::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// A returned row did not decode as expected.
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Request rejected before reaching the database.
    #[error("{0}")]
    Validation(String),

    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0}")]
    Other(String),
}

fn db_message(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db_err) => db_err.message().to_string(),
        None => err.to_string(),
    }
}

impl ResourceError {
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// SQLSTATE code of the underlying database error, if any.
    pub fn sql_state(&self) -> Option<&str> {
        let Self::Query(e) = self else {
            return None;
        };
        e.as_db_error().map(|db_err| db_err.code().code())
    }

    /// Whether the database rejected a reference to `column` as undefined.
    pub fn is_undefined_column(&self, column: &str) -> bool {
        let Self::Query(e) = self else {
            return false;
        };
        let Some(db_err) = e.as_db_error() else {
            return false;
        };
        db_err.code().code() == UNDEFINED_COLUMN && db_err.message().contains(column)
    }

    /// Whether the live schema no longer matches what was inspected.
    pub fn is_schema_drift(&self) -> bool {
        matches!(self.sql_state(), Some(UNDEFINED_COLUMN | UNDEFINED_TABLE))
    }

    /// Classify constraint violations; everything else stays a `Query` error.
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let detail = format!(
                "{}: {}",
                db_err.constraint().unwrap_or("unknown"),
                db_err.message()
            );
            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(detail),
                "23503" => return Self::ForeignKeyViolation(detail),
                "23514" => return Self::CheckViolation(detail),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for ResourceError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn validation_displays_bare_message() {
        let err = ResourceError::validation("at least one filter is required");
        assert_eq!(err.to_string(), "at least one filter is required");
        assert!(err.is_validation());
        assert!(!err.is_not_found());
    }

    #[test]
    fn non_db_errors_have_no_sql_state() {
        assert_eq!(ResourceError::not_found("x").sql_state(), None);
        assert!(!ResourceError::Other("x".into()).is_schema_drift());
        assert!(!ResourceError::Other("x".into()).is_undefined_column("created_at"));
    }

    #[test]
    fn timeout_mentions_the_limit() {
        let err = ResourceError::Timeout(Duration::from_millis(1500));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Request timed out after 1.5s");
    }
}
