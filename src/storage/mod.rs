//! Persistence ports.
//!
//! Handlers and the token store only see these traits. [`PgStore`] backs them with
//! Postgres; [`MemoryStore`] keeps everything in process for tests and database-less
//! development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewUser, Task, TaskInput, TaskQuery, TokenHash, TokenRecord, TokenScope, User};

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Unique constraint on `users.email`.
    #[error("duplicate email")]
    DuplicateEmail,

    /// The row changed (or vanished) since it was read.
    #[error("edit conflict")]
    EditConflict,

    /// The call did not finish before its deadline.
    #[error("storage deadline exceeded")]
    Timeout,

    /// A stored value could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Token persistence. Lookups are exact matches on the full hash.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn put(&self, record: &TokenRecord) -> StorageResult<()>;

    /// Returns the record with this hash and scope whose expiry is after `now`.
    async fn find(
        &self,
        hash: &TokenHash,
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<TokenRecord>>;

    /// Deletes every token of `scope` owned by `user_id`, returning how many went.
    async fn delete_by_scope(&self, user_id: i32, scope: TokenScope) -> StorageResult<u64>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, user: NewUser, now: DateTime<Utc>) -> StorageResult<User>;

    async fn user_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    async fn user_by_id(&self, id: i32) -> StorageResult<Option<User>>;

    /// Writes name, email, password hash and activation flag if `user.version` still
    /// matches, returning the user with its bumped version.
    async fn update_user(&self, user: &User) -> StorageResult<User>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn insert_task(&self, task: &Task) -> StorageResult<Task>;

    /// Tasks owned by `user_id` matching `query`, newest first.
    async fn list_tasks(&self, user_id: i32, query: &TaskQuery) -> StorageResult<Vec<Task>>;

    async fn task_by_id(&self, id: Uuid, user_id: i32) -> StorageResult<Option<Task>>;

    async fn update_task(
        &self,
        id: Uuid,
        user_id: i32,
        input: &TaskInput,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Task>>;

    /// Returns false when no task with that id belongs to `user_id`.
    async fn delete_task(&self, id: Uuid, user_id: i32) -> StorageResult<bool>;
}

/// Everything the service persists.
pub trait Storage: TokenRepository + UserRepository + TaskRepository {}

impl<T> Storage for T where T: TokenRepository + UserRepository + TaskRepository {}
