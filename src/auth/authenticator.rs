use thiserror::Error;

use crate::auth::store::{TokenError, TokenStore};
use crate::auth::token::is_well_formed;
use crate::models::{Principal, TokenScope};
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The header is not `Bearer <token>` or the token has the wrong shape.
    #[error("malformed credential")]
    Malformed,

    /// Well-formed, but no live authentication token matches.
    #[error("invalid credential")]
    Invalid,

    #[error("credential lookup failed: {0}")]
    Upstream(#[source] StorageError),
}

/// Turns an `Authorization` header value into a [`Principal`].
#[derive(Clone)]
pub struct Authenticator {
    tokens: TokenStore,
}

impl Authenticator {
    pub fn new(tokens: TokenStore) -> Self {
        Self { tokens }
    }

    pub async fn authenticate(&self, header: Option<&str>) -> Result<Principal, AuthError> {
        let header = match header {
            None | Some("") => return Ok(Principal::Anonymous),
            Some(value) => value,
        };

        let token = bearer_token(header).ok_or(AuthError::Malformed)?;
        if !is_well_formed(token) {
            return Err(AuthError::Malformed);
        }

        match self.tokens.resolve(token, TokenScope::Authentication).await {
            Ok(user) => Ok(Principal::User(user)),
            Err(TokenError::NotFound) => Err(AuthError::Invalid),
            Err(TokenError::Upstream(e)) | Err(TokenError::Persistence(e)) => {
                Err(AuthError::Upstream(e))
            }
            // resolve never generates.
            Err(TokenError::Generation(_)) => Err(AuthError::Invalid),
        }
    }
}

/// Extracts `<token>` from exactly `Bearer <token>`.
fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::models::NewUser;
    use crate::storage::testing::FailingStore;
    use crate::storage::{MemoryStore, UserRepository};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer  abc"), None);
        assert_eq!(bearer_token("Bearer abc def"), None);
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
    }

    async fn setup() -> (Authenticator, TokenStore, Arc<ManualClock>, i32) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let user = store
            .insert_user(
                NewUser {
                    name: "Ada".to_string(),
                    email: "ada@example.com".to_string(),
                    password_hash: "hash".to_string(),
                    activated: false,
                },
                clock.now(),
            )
            .await
            .unwrap();
        let tokens = TokenStore::new(store, clock.clone(), Duration::from_secs(1));
        (Authenticator::new(tokens.clone()), tokens, clock, user.id)
    }

    #[actix_rt::test]
    async fn test_missing_or_empty_header_is_anonymous() {
        let (auth, _, _, _) = setup().await;
        assert_eq!(auth.authenticate(None).await.unwrap(), Principal::Anonymous);
        assert_eq!(
            auth.authenticate(Some("")).await.unwrap(),
            Principal::Anonymous
        );
    }

    #[actix_rt::test]
    async fn test_malformed_headers() {
        let (auth, _, _, _) = setup().await;
        for header in [
            "Token ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            "Bearer",
            "Bearer short",
            "Bearer abcdefghijklmnopqrstuvwxyz",
        ] {
            let result = auth.authenticate(Some(header)).await;
            assert!(
                matches!(result, Err(AuthError::Malformed)),
                "expected malformed for {header:?}"
            );
        }
    }

    #[actix_rt::test]
    async fn test_valid_token_resolves_user_and_expired_token_is_invalid() {
        let (auth, tokens, clock, user_id) = setup().await;
        let token = tokens
            .issue(user_id, chrono::Duration::hours(24), TokenScope::Authentication)
            .await
            .unwrap();
        let header = format!("Bearer {}", token.plaintext);

        let principal = auth.authenticate(Some(&header)).await.unwrap();
        assert_eq!(principal.user().map(|u| u.id), Some(user_id));

        clock.advance(chrono::Duration::hours(24));
        let result = auth.authenticate(Some(&header)).await;
        assert!(matches!(result, Err(AuthError::Invalid)));
    }

    #[actix_rt::test]
    async fn test_other_scopes_do_not_authenticate() {
        let (auth, tokens, _, user_id) = setup().await;
        let activation = tokens
            .issue(user_id, chrono::Duration::hours(1), TokenScope::Activation)
            .await
            .unwrap();

        let result = auth
            .authenticate(Some(&format!("Bearer {}", activation.plaintext)))
            .await;
        assert!(matches!(result, Err(AuthError::Invalid)));
    }

    #[actix_rt::test]
    async fn test_unknown_token_is_invalid() {
        let (auth, _, _, _) = setup().await;
        let result = auth
            .authenticate(Some("Bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ"))
            .await;
        assert!(matches!(result, Err(AuthError::Invalid)));
    }

    #[actix_rt::test]
    async fn test_storage_failure_is_upstream_not_invalid() {
        let auth = Authenticator::new(TokenStore::new(
            Arc::new(FailingStore::unavailable()),
            Arc::new(ManualClock::default()),
            Duration::from_secs(1),
        ));
        let result = auth
            .authenticate(Some("Bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ"))
            .await;
        assert!(matches!(result, Err(AuthError::Upstream(StorageError::Database(_)))));

        // Malformed credentials are still rejected without touching storage.
        let malformed = auth.authenticate(Some("Bearer short")).await;
        assert!(matches!(malformed, Err(AuthError::Malformed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_deadline_is_upstream() {
        let auth = Authenticator::new(TokenStore::new(
            Arc::new(FailingStore::stalled()),
            Arc::new(ManualClock::default()),
            Duration::from_millis(50),
        ));
        let result = auth
            .authenticate(Some("Bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ"))
            .await;
        assert!(matches!(result, Err(AuthError::Upstream(StorageError::Timeout))));
    }
}
