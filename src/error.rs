//! Application error type.
//!
//! `AppError` implements `actix_web::ResponseError`, so handlers and middleware return it
//! directly and `?` converts component errors (`StorageError`, `TokenError`, `AuthError`,
//! validation and bcrypt failures) through the `From` impls below.
//!
//! Every response body is `{"error": ...}` with a fixed message. Details of server-side
//! failures are logged, never returned.

use std::collections::BTreeMap;

use actix_web::http::{header, StatusCode};
use actix_web::{error::ResponseError, HttpResponse};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

use crate::auth::authenticator::AuthError;
use crate::auth::store::TokenError;
use crate::storage::StorageError;

const SERVER_ERROR_MESSAGE: &str = "the server encountered a problem and could not process your request";
const CREDENTIAL_MESSAGE: &str = "invalid or missing authentication token";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("malformed credential")]
    MalformedCredential,

    #[error("invalid credential")]
    InvalidCredential,

    /// Anonymous caller on an endpoint that needs a user.
    #[error("authentication required")]
    Unauthorized,

    /// Authenticated, but the account is not activated.
    #[error("account not activated")]
    Forbidden,

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("token generation failed: {0}")]
    Generation(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    /// Field name to message.
    #[error("validation failed: {0:?}")]
    Validation(BTreeMap<String, String>),

    #[error("invalid login")]
    InvalidLogin,

    #[error("edit conflict")]
    EditConflict,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// A single-field validation failure.
    pub fn invalid_field(field: &str, message: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), message.to_string());
        AppError::Validation(fields)
    }

    fn body(&self) -> serde_json::Value {
        let message = match self {
            AppError::RateLimitExceeded => "rate limit exceeded",
            AppError::MalformedCredential | AppError::InvalidCredential => CREDENTIAL_MESSAGE,
            AppError::Unauthorized => "you must be authenticated to access this resource",
            AppError::Forbidden => "your user account must be activated to access this resource",
            AppError::Upstream(_)
            | AppError::Generation(_)
            | AppError::Persistence(_)
            | AppError::Internal(_) => SERVER_ERROR_MESSAGE,
            AppError::BadRequest(msg) => return json!({ "error": msg }),
            AppError::NotFound => "the requested resource could not be found",
            AppError::Validation(fields) => return json!({ "error": fields }),
            AppError::InvalidLogin => "invalid authentication credentials",
            AppError::EditConflict => {
                "unable to update the record due to an edit conflict, please try again"
            }
        };
        json!({ "error": message })
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::MalformedCredential
            | AppError::InvalidCredential
            | AppError::Unauthorized
            | AppError::InvalidLogin => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::EditConflict => StatusCode::CONFLICT,
            AppError::Upstream(_)
            | AppError::Generation(_)
            | AppError::Persistence(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}", self);
        }

        let mut response = HttpResponse::build(status);
        if matches!(
            self,
            AppError::MalformedCredential | AppError::InvalidCredential
        ) {
            response.insert_header((header::WWW_AUTHENTICATE, "Bearer"));
        }
        response.json(self.body())
    }
}

impl From<StorageError> for AppError {
    fn from(error: StorageError) -> AppError {
        match error {
            StorageError::DuplicateEmail => {
                AppError::invalid_field("email", "a user with this email already exists")
            }
            StorageError::EditConflict => AppError::EditConflict,
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(error: TokenError) -> AppError {
        match error {
            TokenError::NotFound => AppError::NotFound,
            TokenError::Generation(e) => AppError::Generation(e.to_string()),
            TokenError::Persistence(e) => AppError::Persistence(e.to_string()),
            TokenError::Upstream(e) => AppError::Upstream(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(error: AuthError) -> AppError {
        match error {
            AuthError::Malformed => AppError::MalformedCredential,
            AuthError::Invalid => AppError::InvalidCredential,
            AuthError::Upstream(e) => AppError::Upstream(e.to_string()),
        }
    }
}

/// Keeps the first message reported for each field.
impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> AppError {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let message = errors
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is invalid".to_string());
                (field.to_string(), message)
            })
            .collect();
        AppError::Validation(fields)
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::Internal(format!("bcrypt: {}", error))
    }
}
