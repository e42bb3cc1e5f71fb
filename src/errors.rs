use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use sqlx::Error as SqlxError;
use std::env::VarError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found")]
    NotFoundOrForbidden,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Length and height must both be greater than zero")]
    InvalidDimensions,

    #[error("Discount must be between 0% and {max}%")]
    DiscountOutOfRange { max: f64 },

    #[error("Invalid image format")]
    InvalidImage,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Please verify your email first")]
    AccountNotVerified,

    #[error("Email already exists")]
    EmailTaken,

    #[error("Invalid or expired OTP")]
    InvalidOtp,

    #[error("Please wait {retry_after} seconds before requesting another code")]
    OtpCooldown { retry_after: i64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stored record is unreadable: {0}")]
    Corrupt(String),

    #[error("Password hashing error: {0}")]
    PasswordError(String),

    #[error("Identity error: {0}")]
    IdentityError(String),

    #[error("Template error: {0}")]
    TemplateError(#[from] tera::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] VarError),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] SqlxError),
}

impl AppError {
    /// Stable machine-readable name of the failure, sent alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFoundOrForbidden => "not_found_or_forbidden",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidDimensions => "invalid_dimensions",
            AppError::DiscountOutOfRange { .. } => "discount_out_of_range",
            AppError::InvalidImage => "invalid_image",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::AccountNotVerified => "account_not_verified",
            AppError::EmailTaken => "email_taken",
            AppError::InvalidOtp => "invalid_otp",
            AppError::OtpCooldown { .. } => "too_many_requests",
            AppError::Config(_)
            | AppError::Corrupt(_)
            | AppError::PasswordError(_)
            | AppError::IdentityError(_)
            | AppError::TemplateError(_)
            | AppError::JsonError(_)
            | AppError::EnvVarError(_)
            | AppError::SqlxError(_) => "operational",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: &'a str,
    message: String,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::AccountNotVerified => StatusCode::FORBIDDEN,
            AppError::NotFoundOrForbidden => StatusCode::NOT_FOUND,
            AppError::Validation(_)
            | AppError::InvalidDimensions
            | AppError::DiscountOutOfRange { .. }
            | AppError::InvalidImage
            | AppError::InvalidOtp => StatusCode::BAD_REQUEST,
            AppError::EmailTaken => StatusCode::CONFLICT,
            AppError::OtpCooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("Request failed: {}", self);
            "Server error".to_owned()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(ErrorBody {
            kind: self.kind(),
            message,
        })
    }
}

impl From<AppError> for std::io::Error {
    fn from(err: AppError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
    }
}
