//! Request admission.
//!
//! Every request under `/api/v1` goes through, in order:
//!
//! 1. the per-client rate limiter,
//! 2. bearer-token authentication, which yields a [`Principal`],
//! 3. the endpoint's [`Access`] requirement.
//!
//! The first stage to fail decides the response. [`RequestGate`] runs stages 1 and 2 and
//! is what the HTTP middleware calls; [`authorize`] is stage 3.

use std::sync::Arc;

use crate::auth::Authenticator;
use crate::error::AppError;
use crate::models::Principal;
use crate::ratelimit::RateLimiter;

/// What an endpoint requires of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Activated,
}

/// Checks `principal` against `access`. Anonymous callers are always reported as
/// unauthenticated before activation is considered.
pub fn authorize(principal: &Principal, access: Access) -> Result<(), AppError> {
    match (access, principal) {
        (Access::Public, _) => Ok(()),
        (_, Principal::Anonymous) => Err(AppError::Unauthorized),
        (Access::Authenticated, Principal::User(_)) => Ok(()),
        (Access::Activated, Principal::User(user)) if user.activated => Ok(()),
        (Access::Activated, Principal::User(_)) => Err(AppError::Forbidden),
    }
}

#[derive(Clone)]
pub struct RequestGate {
    limiter: Arc<RateLimiter>,
    authenticator: Authenticator,
}

impl RequestGate {
    pub fn new(limiter: Arc<RateLimiter>, authenticator: Authenticator) -> Self {
        Self {
            limiter,
            authenticator,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Rate limits `client`, then authenticates the raw `Authorization` header bytes.
    ///
    /// `client` may only be `None` when the limiter is disabled; otherwise a missing key is
    /// an internal error. The header is not even decoded until the limiter has let the
    /// request through.
    pub async fn admit(
        &self,
        client: Option<&str>,
        authorization: Option<&[u8]>,
    ) -> Result<Principal, AppError> {
        if self.limiter.is_enabled() {
            let client = client
                .ok_or_else(|| AppError::Internal("request has no peer address".to_string()))?;
            if !self.limiter.allow(client) {
                log::warn!("rate limit exceeded for {}", client);
                return Err(AppError::RateLimitExceeded);
            }
        }

        let authorization = match authorization {
            None => None,
            Some(raw) => Some(header_text(raw).ok_or(AppError::MalformedCredential)?),
        };
        Ok(self.authenticator.authenticate(authorization).await?)
    }

    /// All three stages.
    pub async fn check(
        &self,
        client: Option<&str>,
        authorization: Option<&[u8]>,
        access: Access,
    ) -> Result<Principal, AppError> {
        let principal = self.admit(client, authorization).await?;
        authorize(&principal, access)?;
        Ok(principal)
    }
}

/// The header as text, provided it is visible ASCII (tabs allowed), the same rule
/// `HeaderValue::to_str` applies.
fn header_text(raw: &[u8]) -> Option<&str> {
    if raw.iter().all(|&b| b == b'\t' || (b' '..=b'~').contains(&b)) {
        std::str::from_utf8(raw).ok()
    } else {
        None
    }
}
