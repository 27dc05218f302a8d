use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::auth::token::{generate_plaintext, hash_plaintext};
use crate::clock::Clock;
use crate::models::{Token, TokenRecord, TokenScope, User};
use crate::storage::{Storage, StorageError, StorageResult};

#[derive(Debug, Error)]
pub enum TokenError {
    /// Wrong plaintext, wrong scope, expired, or the owner is gone.
    #[error("token not found")]
    NotFound,

    #[error("token generation failed: {0}")]
    Generation(#[from] rand::Error),

    #[error("token write failed: {0}")]
    Persistence(#[source] StorageError),

    #[error("token lookup failed: {0}")]
    Upstream(#[source] StorageError),
}

/// Issues, resolves and revokes scoped bearer tokens.
///
/// Every storage call is bounded by `timeout`; a call that overruns is reported the same
/// way as a failed one.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            storage,
            clock,
            timeout,
        }
    }

    /// Creates a token for `user_id` valid for `ttl` from now.
    ///
    /// The returned [`Token`] is the only copy of the plaintext.
    pub async fn issue(
        &self,
        user_id: i32,
        ttl: chrono::Duration,
        scope: TokenScope,
    ) -> Result<Token, TokenError> {
        let plaintext = generate_plaintext()?;
        let expiry = self.clock.now() + ttl;

        let record = TokenRecord {
            hash: hash_plaintext(&plaintext),
            user_id,
            scope,
            expiry,
        };
        self.bounded(self.storage.put(&record))
            .await
            .map_err(TokenError::Persistence)?;

        Ok(Token {
            plaintext,
            expiry,
            user_id,
            scope,
        })
    }

    /// Returns the owner of a live token with this plaintext and scope.
    pub async fn resolve(&self, plaintext: &str, scope: TokenScope) -> Result<User, TokenError> {
        let hash = hash_plaintext(plaintext);
        let now = self.clock.now();

        let record = self
            .bounded(self.storage.find(&hash, scope, now))
            .await
            .map_err(TokenError::Upstream)?
            .ok_or(TokenError::NotFound)?;

        self.bounded(self.storage.user_by_id(record.user_id))
            .await
            .map_err(TokenError::Upstream)?
            .ok_or(TokenError::NotFound)
    }

    /// Deletes every token of `scope` held by `user_id`.
    pub async fn revoke_scope(&self, user_id: i32, scope: TokenScope) -> Result<u64, TokenError> {
        let removed = self
            .bounded(self.storage.delete_by_scope(user_id, scope))
            .await
            .map_err(TokenError::Persistence)?;
        log::debug!("revoked {} {} token(s) for user {}", removed, scope, user_id);
        Ok(removed)
    }

    async fn bounded<T>(&self, call: impl Future<Output = StorageResult<T>>) -> StorageResult<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StorageError::Timeout)?
    }
}
