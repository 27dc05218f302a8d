//! Postgres-backed storage using `sqlx`.
//!
//! Schema lives in `migrations/`. Queries are built at runtime with `query_as`, so the
//! crate compiles without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{StorageError, StorageResult, TaskRepository, TokenRepository, UserRepository};
use crate::models::{NewUser, Task, TaskInput, TaskQuery, TokenHash, TokenRecord, TokenScope, User};

const USER_COLUMNS: &str = "id, name, email, password_hash, activated, created_at, version";
const TASK_COLUMNS: &str = "id, title, description, priority, status, due_date, created_at, updated_at, user_id, assigned_to";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects, then applies any pending migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::Database(e.into()))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct TokenRow {
    hash: Vec<u8>,
    user_id: i32,
    scope: String,
    expiry: DateTime<Utc>,
}

impl TryFrom<TokenRow> for TokenRecord {
    type Error = StorageError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        Ok(TokenRecord {
            hash: TokenHash::try_from(row.hash.as_slice())
                .map_err(|_| StorageError::Corrupt("token hash length".into()))?,
            user_id: row.user_id,
            scope: row
                .scope
                .parse()
                .map_err(|e: crate::models::token::UnknownScope| StorageError::Corrupt(e.to_string()))?,
            expiry: row.expiry,
        })
    }
}

/// Maps a unique violation on `users.email` to [`StorageError::DuplicateEmail`].
fn map_user_write_error(error: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_error) = &error {
        let is_unique_violation = db_error.code().as_deref() == Some("23505");
        let on_email = db_error
            .constraint()
            .is_some_and(|constraint| constraint.contains("users_email"));
        if is_unique_violation && on_email {
            return StorageError::DuplicateEmail;
        }
    }
    StorageError::Database(error)
}

#[async_trait]
impl TokenRepository for PgStore {
    async fn put(&self, record: &TokenRecord) -> StorageResult<()> {
        sqlx::query("INSERT INTO tokens (hash, user_id, scope, expiry) VALUES ($1, $2, $3, $4)")
            .bind(record.hash.as_bytes().as_slice())
            .bind(record.user_id)
            .bind(record.scope.as_str())
            .bind(record.expiry)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find(
        &self,
        hash: &TokenHash,
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<TokenRecord>> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT hash, user_id, scope, expiry FROM tokens
             WHERE hash = $1 AND scope = $2 AND expiry > $3",
        )
        .bind(hash.as_bytes().as_slice())
        .bind(scope.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TokenRecord::try_from).transpose()
    }

    async fn delete_by_scope(&self, user_id: i32, scope: TokenScope) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE user_id = $1 AND scope = $2")
            .bind(user_id)
            .bind(scope.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn insert_user(&self, user: NewUser, now: DateTime<Utc>) -> StorageResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, password_hash, activated, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.activated)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_user_write_error)
    }

    async fn user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn user_by_id(&self, id: i32) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> StorageResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
             WHERE id = $5 AND version = $6
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.activated)
        .bind(user.id)
        .bind(user.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_user_write_error)?
        .ok_or(StorageError::EditConflict)
    }
}

#[async_trait]
impl TaskRepository for PgStore {
    async fn insert_task(&self, task: &Task) -> StorageResult<Task> {
        let created = sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks (id, title, description, priority, status, due_date, created_at, updated_at, user_id, assigned_to)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority)
        .bind(task.status)
        .bind(task.due_date)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.user_id)
        .bind(task.assigned_to)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn list_tasks(&self, user_id: i32, query: &TaskQuery) -> StorageResult<Vec<Task>> {
        // Conditions for the optional filters are appended with numbered placeholders and
        // bound below in the same order.
        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = $1");
        let mut param_count = 2;
        let mut conditions: Vec<String> = Vec::new();

        if query.status.is_some() {
            conditions.push(format!("status = ${}", param_count));
            param_count += 1;
        }
        if query.priority.is_some() {
            conditions.push(format!("priority = ${}", param_count));
            param_count += 1;
        }
        if query.assigned_to.is_some() {
            conditions.push(format!("assigned_to = ${}", param_count));
            param_count += 1;
        }
        if query.search.is_some() {
            conditions.push(format!(
                "(title ILIKE ${0} OR description ILIKE ${0})",
                param_count
            ));
        }

        if !conditions.is_empty() {
            sql.push_str(" AND ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut query_builder = sqlx::query_as::<_, Task>(&sql).bind(user_id);
        if let Some(status) = query.status {
            query_builder = query_builder.bind(status);
        }
        if let Some(priority) = query.priority {
            query_builder = query_builder.bind(priority);
        }
        if let Some(assigned_to) = query.assigned_to {
            query_builder = query_builder.bind(assigned_to);
        }
        if let Some(search) = &query.search {
            query_builder = query_builder.bind(format!("%{}%", escape_like(search)));
        }

        Ok(query_builder.fetch_all(&self.pool).await?)
    }

    async fn task_by_id(&self, id: Uuid, user_id: i32) -> StorageResult<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn update_task(
        &self,
        id: Uuid,
        user_id: i32,
        input: &TaskInput,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks
             SET title = $1, description = $2, priority = $3, status = $4, due_date = $5,
                 assigned_to = $6, updated_at = $7
             WHERE id = $8 AND user_id = $9
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.priority)
        .bind(input.status)
        .bind(input.due_date)
        .bind(input.assigned_to)
        .bind(now)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn delete_task(&self, id: Uuid, user_id: i32) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Escapes `%`, `_` and `\` so user input matches literally inside `ILIKE`.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
