use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

use crate::auth::token::is_well_formed;

lazy_static::lazy_static! {
    // At least one non-whitespace character.
    static ref NOT_BLANK: Regex = Regex::new(r"\S").unwrap();
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    /// bcrypt hash of the account password. Never serialized.
    #[serde(skip)]
    pub password_hash: String,
    pub activated: bool,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped on every update.
    #[serde(skip)]
    pub version: i32,
}

/// Fields needed to insert a user; the store assigns id, timestamps and version.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub activated: bool,
}

/// The identity attached to a request once it has passed authentication.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    Anonymous,
    User(User),
}

impl Principal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::User(user) => Some(user),
            Principal::Anonymous => None,
        }
    }
}

/// Password rules count bytes, since bcrypt only reads the first 72.
fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.len() < 8 {
        let mut err = ValidationError::new("length");
        err.message = Some("must be at least 8 bytes long".into());
        return Err(err);
    }
    if password.len() > 72 {
        let mut err = ValidationError::new("length");
        err.message = Some("must not be more than 72 bytes long".into());
        return Err(err);
    }
    Ok(())
}

fn validate_token_shape(token: &str) -> Result<(), ValidationError> {
    if is_well_formed(token) {
        Ok(())
    } else {
        let mut err = ValidationError::new("token");
        err.message = Some("must be 26 bytes long".into());
        Err(err)
    }
}

/// Payload for `POST /api/v1/users`.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    #[validate(
        length(max = 500, message = "must not be more than 500 characters long"),
        regex(path = "NOT_BLANK", message = "must be provided")
    )]
    pub name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(custom = "validate_password")]
    pub password: String,
}

/// Payload for `POST /api/v1/tokens/authentication`.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(custom = "validate_password")]
    pub password: String,
}

/// Payload for `PUT /api/v1/users/activated`.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ActivateRequest {
    #[validate(custom = "validate_token_shape")]
    pub token: String,
}

/// Payload for `POST /api/v1/tokens/password-reset`.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PasswordResetRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
}

/// Payload for `PUT /api/v1/users/password`.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    #[validate(custom = "validate_password")]
    pub password: String,
    #[validate(custom = "validate_token_shape")]
    pub token: String,
}
