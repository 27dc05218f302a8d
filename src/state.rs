use std::sync::Arc;

use crate::auth::TokenStore;
use crate::background::BackgroundTasks;
use crate::clock::Clock;
use crate::config::{Config, TokenTtls};
use crate::models::{Token, User};
use crate::notify::Notifier;
use crate::storage::Storage;

/// Shared handler state, registered once as `web::Data<AppState>`.
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub tokens: TokenStore,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub background: Arc<BackgroundTasks>,
    pub token_ttls: TokenTtls,
    pub bcrypt_cost: u32,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        background: Arc<BackgroundTasks>,
        config: &Config,
    ) -> Self {
        let tokens = TokenStore::new(storage.clone(), clock.clone(), config.storage_timeout);
        Self {
            storage,
            tokens,
            clock,
            notifier,
            background,
            token_ttls: config.token_ttls,
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    /// Hands `token` to the notifier after the response has gone out.
    pub fn notify_in_background(&self, recipient: User, token: Token) {
        let notifier = self.notifier.clone();
        self.background.spawn(async move {
            if let Err(e) = notifier.send_token(&recipient, &token).await {
                log::error!("failed to deliver {} token to user {}: {}", token.scope, recipient.id, e);
            }
        });
    }
}
