use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid recurrence rule: {0}")]
    InvalidRRule(String),

    #[error("A todo may have at most {0} active reminders")]
    TooManyReminders(usize),

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),
}

impl CoreError {
    /// Machine-readable error code for the uniform API error shape.
    ///
    /// Owner-mismatch reads are reported as `RESOURCE_NOT_FOUND` by the
    /// repository layer itself (owner-scoped queries simply find nothing),
    /// so no separate permission code appears here.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Database(_) | CoreError::Migration(_) | CoreError::Io(_) => {
                codes::INTERNAL_ERROR
            }
            CoreError::NotFound(_) => codes::RESOURCE_NOT_FOUND,
            CoreError::InvalidInput(_)
            | CoreError::InvalidTimezone(_)
            | CoreError::InvalidRRule(_)
            | CoreError::TooManyReminders(_) => codes::VALIDATION_ERROR,
            CoreError::MissingConfiguration(_) => codes::MISSING_CONFIGURATION,
        }
    }
}

/// Machine-readable error codes shared with the HTTP layer.
///
/// The authentication and permission codes are issued by the (external)
/// request layer; they are listed here so the whole taxonomy lives in one
/// place.
pub mod codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const AUTHENTICATION_REQUIRED: &str = "AUTHENTICATION_REQUIRED";
    pub const INVALID_TOKEN: &str = "INVALID_TOKEN";
    pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const RESOURCE_NOT_FOUND: &str = "RESOURCE_NOT_FOUND";
    pub const MISSING_CONFIGURATION: &str = "MISSING_CONFIGURATION";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CoreError::NotFound("Todo".into()).code(),
            codes::RESOURCE_NOT_FOUND
        );
        assert_eq!(
            CoreError::InvalidInput("bad".into()).code(),
            codes::VALIDATION_ERROR
        );
        assert_eq!(CoreError::TooManyReminders(5).code(), codes::VALIDATION_ERROR);
        assert_eq!(
            CoreError::MissingConfiguration("vapid".into()).code(),
            codes::MISSING_CONFIGURATION
        );
    }
}
