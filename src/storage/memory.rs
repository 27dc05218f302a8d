//! In-process storage.
//!
//! Not durable: all state is lost on restart. Each collection sits behind its own
//! `parking_lot::RwLock`; every operation holds one lock for its whole duration, so single
//! operations are atomic with respect to each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{StorageError, StorageResult, TaskRepository, TokenRepository, UserRepository};
use crate::models::{NewUser, Task, TaskInput, TaskQuery, TokenHash, TokenRecord, TokenScope, User};

#[derive(Debug, Default)]
pub struct MemoryStore {
    next_user_id: AtomicI32,
    users: RwLock<HashMap<i32, User>>,
    tokens: RwLock<Vec<TokenRecord>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of token rows held, expired ones included.
    pub fn token_count(&self) -> usize {
        self.tokens.read().len()
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn put(&self, record: &TokenRecord) -> StorageResult<()> {
        self.tokens.write().push(record.clone());
        Ok(())
    }

    async fn find(
        &self,
        hash: &TokenHash,
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<TokenRecord>> {
        let tokens = self.tokens.read();
        Ok(tokens
            .iter()
            .find(|record| record.hash == *hash && record.scope == scope && record.expiry > now)
            .cloned())
    }

    async fn delete_by_scope(&self, user_id: i32, scope: TokenScope) -> StorageResult<u64> {
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|record| !(record.user_id == user_id && record.scope == scope));
        Ok((before - tokens.len()) as u64)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(&self, user: NewUser, now: DateTime<Utc>) -> StorageResult<User> {
        let mut users = self.users.write();
        if users.values().any(|existing| existing.email == user.email) {
            return Err(StorageError::DuplicateEmail);
        }

        let id = self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1;
        let stored = User {
            id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            activated: user.activated,
            created_at: now,
            version: 1,
        };
        users.insert(id, stored.clone());
        Ok(stored)
    }

    async fn user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn user_by_id(&self, id: i32) -> StorageResult<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn update_user(&self, user: &User) -> StorageResult<User> {
        let mut users = self.users.write();
        if users
            .values()
            .any(|other| other.id != user.id && other.email == user.email)
        {
            return Err(StorageError::DuplicateEmail);
        }

        let stored = users.get_mut(&user.id).ok_or(StorageError::EditConflict)?;
        if stored.version != user.version {
            return Err(StorageError::EditConflict);
        }

        stored.name = user.name.clone();
        stored.email = user.email.clone();
        stored.password_hash = user.password_hash.clone();
        stored.activated = user.activated;
        stored.version += 1;
        Ok(stored.clone())
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn insert_task(&self, task: &Task) -> StorageResult<Task> {
        self.tasks.write().insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn list_tasks(&self, user_id: i32, query: &TaskQuery) -> StorageResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .values()
            .filter(|task| task.user_id == user_id && task.matches(query))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn task_by_id(&self, id: Uuid, user_id: i32) -> StorageResult<Option<Task>> {
        Ok(self
            .tasks
            .read()
            .get(&id)
            .filter(|task| task.user_id == user_id)
            .cloned())
    }

    async fn update_task(
        &self,
        id: Uuid,
        user_id: i32,
        input: &TaskInput,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Task>> {
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.get_mut(&id).filter(|task| task.user_id == user_id) else {
            return Ok(None);
        };

        task.title = input.title.clone();
        task.description = input.description.clone();
        task.priority = input.priority;
        task.status = input.status;
        task.due_date = input.due_date;
        task.assigned_to = input.assigned_to;
        task.updated_at = now;
        Ok(Some(task.clone()))
    }

    async fn delete_task(&self, id: Uuid, user_id: i32) -> StorageResult<bool> {
        let mut tasks = self.tasks.write();
        match tasks.get(&id) {
            Some(task) if task.user_id == user_id => {
                tasks.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
