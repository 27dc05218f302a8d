//! Storage that never succeeds, for exercising failure paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{StorageError, StorageResult, TaskRepository, TokenRepository, UserRepository};
use crate::models::{NewUser, Task, TaskInput, TaskQuery, TokenHash, TokenRecord, TokenScope, User};

/// Every call either hangs forever or fails straight away with a database error.
#[derive(Debug, Clone, Copy)]
pub struct FailingStore {
    stall: bool,
}

impl FailingStore {
    /// Calls never complete.
    pub fn stalled() -> Self {
        Self { stall: true }
    }

    /// Calls fail as if the pool had no connection to hand out.
    pub fn unavailable() -> Self {
        Self { stall: false }
    }

    async fn fail<T>(&self) -> StorageResult<T> {
        if self.stall {
            std::future::pending().await
        } else {
            Err(StorageError::Database(sqlx::Error::PoolTimedOut))
        }
    }
}

#[async_trait]
impl TokenRepository for FailingStore {
    async fn put(&self, _record: &TokenRecord) -> StorageResult<()> {
        self.fail().await
    }

    async fn find(
        &self,
        _hash: &TokenHash,
        _scope: TokenScope,
        _now: DateTime<Utc>,
    ) -> StorageResult<Option<TokenRecord>> {
        self.fail().await
    }

    async fn delete_by_scope(&self, _user_id: i32, _scope: TokenScope) -> StorageResult<u64> {
        self.fail().await
    }
}

#[async_trait]
impl UserRepository for FailingStore {
    async fn insert_user(&self, _user: NewUser, _now: DateTime<Utc>) -> StorageResult<User> {
        self.fail().await
    }

    async fn user_by_email(&self, _email: &str) -> StorageResult<Option<User>> {
        self.fail().await
    }

    async fn user_by_id(&self, _id: i32) -> StorageResult<Option<User>> {
        self.fail().await
    }

    async fn update_user(&self, _user: &User) -> StorageResult<User> {
        self.fail().await
    }
}

#[async_trait]
impl TaskRepository for FailingStore {
    async fn insert_task(&self, _task: &Task) -> StorageResult<Task> {
        self.fail().await
    }

    async fn list_tasks(&self, _user_id: i32, _query: &TaskQuery) -> StorageResult<Vec<Task>> {
        self.fail().await
    }

    async fn task_by_id(&self, _id: Uuid, _user_id: i32) -> StorageResult<Option<Task>> {
        self.fail().await
    }

    async fn update_task(
        &self,
        _id: Uuid,
        _user_id: i32,
        _input: &TaskInput,
        _now: DateTime<Utc>,
    ) -> StorageResult<Option<Task>> {
        self.fail().await
    }

    async fn delete_task(&self, _id: Uuid, _user_id: i32) -> StorageResult<bool> {
        self.fail().await
    }
}
