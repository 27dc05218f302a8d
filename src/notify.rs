use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Token, User};

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers freshly issued activation and password-reset tokens to their owner.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_token(&self, recipient: &User, token: &Token) -> Result<(), NotifyError>;
}

/// Records that a token went out, without the plaintext.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_token(&self, recipient: &User, token: &Token) -> Result<(), NotifyError> {
        log::info!(
            "issued {} token for user {}, expires {}",
            token.scope,
            recipient.id,
            token.expiry
        );
        Ok(())
    }
}
