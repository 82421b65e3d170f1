use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::sessions::{NewSession, Session};
use super::users::{CreateUser, User};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Email already exists: {0}")]
    DuplicateEmail(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// True when the store could not hand out a connection in time.
    ///
    /// Callers surface these as retryable 5xx rather than credential failures.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StorageError::Database(sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed)
        )
    }
}

/// Storage backend for user accounts
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by exact email. `None` when no account exists.
    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    /// Look up a user by id
    async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<User>>;

    /// Create a user and return its id
    async fn create(&self, user: CreateUser) -> StorageResult<Uuid>;

    /// Atomically bump the failed-login counter for an email
    async fn increment_failed_login(&self, email: &str) -> StorageResult<()>;

    /// Reset the failed-login counter and stamp `last_login`
    async fn record_successful_login(&self, id: Uuid) -> StorageResult<()>;

    /// Reset the failed-login counter, ending a lockout
    async fn reset_failed_logins(&self, email: &str) -> StorageResult<()>;

    /// Update the active flag
    async fn set_active(&self, email: &str, is_active: bool) -> StorageResult<()>;

    /// List all users, oldest first
    async fn list(&self) -> StorageResult<Vec<User>>;
}

/// Storage backend for login sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session and return its id
    async fn create(&self, session: NewSession) -> StorageResult<Uuid>;

    /// Find a session by its token together with the owning user
    async fn find_by_token(&self, token: &str) -> StorageResult<Option<(Session, User)>>;

    /// Mark the session carrying `token` invalid.
    ///
    /// Succeeds silently when no such session exists or it is already invalid.
    async fn invalidate(&self, token: &str) -> StorageResult<()>;

    /// Delete sessions that expired before `now`, returning how many were removed
    async fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<u64>;
}
