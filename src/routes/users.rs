use actix_web::{post, put, web, HttpResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    auth::{hash_password, TokenError},
    error::AppError,
    models::{
        user::{ActivateRequest, RegisterRequest, ResetPasswordRequest},
        NewUser, TokenScope,
    },
    state::AppState,
};

/// Registers a new, not yet activated, user.
///
/// An activation token is issued and handed to the notifier once the response is on its
/// way, so a slow notifier never delays registration.
///
/// ## Responses:
/// - `202 Accepted`: `{"user": User}`.
/// - `400 Bad Request`: body is not the expected JSON.
/// - `422 Unprocessable Entity`: invalid fields, or the email is already registered.
#[post("")]
pub async fn register_user(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    let input = body.into_inner();

    let password_hash = hash_password(&input.password, state.bcrypt_cost)?;
    let user = state
        .storage
        .insert_user(
            NewUser {
                name: input.name,
                email: input.email,
                password_hash,
                activated: false,
            },
            state.clock.now(),
        )
        .await?;

    let token = state
        .tokens
        .issue(user.id, state.token_ttls.activation, TokenScope::Activation)
        .await?;
    state.notify_in_background(user.clone(), token);

    log::info!("registered user {}", user.id);
    Ok(HttpResponse::Accepted().json(json!({ "user": user })))
}

/// Activates the account owning an activation token.
///
/// Every activation token of that user is revoked afterwards.
///
/// ## Responses:
/// - `200 OK`: `{"user": User}` with `activated: true`.
/// - `409 Conflict`: the user changed while being activated.
/// - `422 Unprocessable Entity`: malformed, unknown or expired token.
#[put("/activated")]
pub async fn activate_user(
    state: web::Data<AppState>,
    body: web::Json<ActivateRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;

    let mut user = match state.tokens.resolve(&body.token, TokenScope::Activation).await {
        Ok(user) => user,
        Err(TokenError::NotFound) => {
            return Err(AppError::invalid_field(
                "token",
                "invalid or expired activation token",
            ))
        }
        Err(e) => return Err(e.into()),
    };

    user.activated = true;
    let user = state.storage.update_user(&user).await?;
    state
        .tokens
        .revoke_scope(user.id, TokenScope::Activation)
        .await?;

    log::info!("activated user {}", user.id);
    Ok(HttpResponse::Ok().json(json!({ "user": user })))
}

/// Sets a new password using a password-reset token.
///
/// Outstanding reset tokens and every authentication token of the user are revoked, so
/// existing sessions end with the old password.
#[put("/password")]
pub async fn reset_password(
    state: web::Data<AppState>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    let input = body.into_inner();

    let mut user = match state
        .tokens
        .resolve(&input.token, TokenScope::PasswordReset)
        .await
    {
        Ok(user) => user,
        Err(TokenError::NotFound) => {
            return Err(AppError::invalid_field(
                "token",
                "invalid or expired password reset token",
            ))
        }
        Err(e) => return Err(e.into()),
    };

    user.password_hash = hash_password(&input.password, state.bcrypt_cost)?;
    let user = state.storage.update_user(&user).await?;

    for scope in [TokenScope::PasswordReset, TokenScope::Authentication] {
        state.tokens.revoke_scope(user.id, scope).await?;
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "your password was successfully reset" })))
}
