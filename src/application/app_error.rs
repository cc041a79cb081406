use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Invalid or missing identity")]
    Auth,

    #[error("Webhook signature verification failed: {0}")]
    Signature(String),

    #[error("Not found")]
    NotFound,

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    ValidationError,
    AuthError,
    SignatureError,
    NotFound,
    GatewayError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::SignatureError => "SIGNATURE_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::GatewayError => "GATEWAY_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

/// Whether a redelivery of the same event could succeed where this attempt
/// failed. Drives the release-vs-complete decision on the idempotency guard.
pub fn is_retryable(error: &AppError) -> bool {
    match error {
        AppError::Database(_) => true,
        AppError::Gateway(_) => true,
        AppError::Internal(_) => true,

        // A missing user mapping or malformed event will not be fixed
        // by the gateway sending the same payload again.
        AppError::Reconciliation(_) => false,
        AppError::Validation(_) => false,
        AppError::Auth => false,
        AppError::Signature(_) => false,
        AppError::NotFound => false,
    }
}

pub type AppResult<T> = Result<T, AppError>;
