use actix_web::{delete, post, web, HttpResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    auth::{verify_password, Authorize, CurrentUser},
    error::AppError,
    gate::Access,
    models::{
        user::{LoginRequest, PasswordResetRequest},
        TokenScope,
    },
    state::AppState,
};

/// Exchanges an email and password for an authentication token.
///
/// Unknown email and wrong password produce the same response.
///
/// ## Responses:
/// - `201 Created`: `{"authentication_token": {"token": "...", "expiry": "..."}}`.
/// - `401 Unauthorized`: credentials do not match.
/// - `422 Unprocessable Entity`: invalid fields.
#[post("/authentication")]
pub async fn create_authentication_token(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;

    let user = state
        .storage
        .user_by_email(&body.email)
        .await?
        .ok_or(AppError::InvalidLogin)?;
    if !verify_password(&body.password, &user.password_hash)? {
        return Err(AppError::InvalidLogin);
    }

    let token = state
        .tokens
        .issue(
            user.id,
            state.token_ttls.authentication,
            TokenScope::Authentication,
        )
        .await?;

    Ok(HttpResponse::Created().json(json!({ "authentication_token": token })))
}

/// Logs the caller out everywhere by revoking all of their authentication tokens.
#[delete("/authentication", wrap = "Authorize::new(Access::Authenticated)")]
pub async fn delete_authentication_tokens(
    state: web::Data<AppState>,
    user: CurrentUser,
) -> Result<HttpResponse, AppError> {
    state
        .tokens
        .revoke_scope(user.0.id, TokenScope::Authentication)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Starts a password reset.
///
/// Only activated accounts get a token, but the response never reveals whether the
/// address is registered.
#[post("/password-reset")]
pub async fn create_password_reset_token(
    state: web::Data<AppState>,
    body: web::Json<PasswordResetRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;

    match state.storage.user_by_email(&body.email).await? {
        Some(user) if user.activated => {
            let token = state
                .tokens
                .issue(
                    user.id,
                    state.token_ttls.password_reset,
                    TokenScope::PasswordReset,
                )
                .await?;
            state.notify_in_background(user, token);
        }
        Some(user) => log::debug!("password reset requested for unactivated user {}", user.id),
        None => {}
    }

    Ok(HttpResponse::Accepted().json(json!({
        "message": "an email will be sent to you containing password reset instructions"
    })))
}
