//! In-memory stores with the same semantics as the PostgreSQL ones.
//!
//! Used by the test suite to drive the auth service and router without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::sessions::{NewSession, Session};
use super::traits::{SessionStore, StorageError, StorageResult, UserStore};
use super::users::{CreateUser, User, DEFAULT_ROLES};

/// User store backed by a map keyed on user id
pub struct MemoryUserStore {
    roles: HashMap<String, Uuid>,
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    /// Create an empty store seeded with the default roles
    pub fn new() -> Self {
        let roles = DEFAULT_ROLES
            .iter()
            .map(|(name, _)| (name.to_string(), Uuid::new_v4()))
            .collect();

        Self {
            roles,
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a role name to its id
    pub fn role_id(&self, name: &str) -> Option<Uuid> {
        self.roles.get(name).copied()
    }

    fn role_name(&self, id: Uuid) -> Option<String> {
        self.roles
            .iter()
            .find(|(_, role_id)| **role_id == id)
            .map(|(name, _)| name.clone())
    }

    fn with_email<T>(&self, email: &str, f: impl FnOnce(&mut User) -> T) -> StorageResult<T> {
        let mut users = self.users.write();
        users
            .values_mut()
            .find(|u| u.email == email)
            .map(f)
            .ok_or_else(|| StorageError::UserNotFound(email.to_string()))
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        Ok(self.users.read().values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn create(&self, user: CreateUser) -> StorageResult<Uuid> {
        let role_name = self
            .role_name(user.role_id)
            .ok_or_else(|| StorageError::UnknownRole(user.role_id.to_string()))?;

        let mut users = self.users.write();
        if users.values().any(|u| u.email == user.email) {
            return Err(StorageError::DuplicateEmail(user.email));
        }

        let id = Uuid::new_v4();
        users.insert(
            id,
            User {
                id,
                email: user.email,
                password_hash: user.password_hash,
                role_id: user.role_id,
                role_name,
                first_name: user.first_name,
                last_name: user.last_name,
                phone_number: user.phone_number,
                is_active: true,
                failed_login_attempts: 0,
                created_at: Utc::now(),
                last_login: None,
            },
        );

        Ok(id)
    }

    async fn increment_failed_login(&self, email: &str) -> StorageResult<()> {
        // Unknown emails are a no-op, like an UPDATE matching no rows
        let _ = self.with_email(email, |u| u.failed_login_attempts += 1);
        Ok(())
    }

    async fn record_successful_login(&self, id: Uuid) -> StorageResult<()> {
        if let Some(user) = self.users.write().get_mut(&id) {
            user.failed_login_attempts = 0;
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn reset_failed_logins(&self, email: &str) -> StorageResult<()> {
        self.with_email(email, |u| u.failed_login_attempts = 0)
    }

    async fn set_active(&self, email: &str, is_active: bool) -> StorageResult<()> {
        self.with_email(email, |u| u.is_active = is_active)
    }

    async fn list(&self) -> StorageResult<Vec<User>> {
        let mut users: Vec<User> = self.users.read().values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }
}

/// Session store keyed on token, joined against a [`MemoryUserStore`]
pub struct MemorySessionStore {
    users: Arc<MemoryUserStore>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new(users: Arc<MemoryUserStore>) -> Self {
        Self {
            users,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored sessions, valid or not
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: NewSession) -> StorageResult<Uuid> {
        if self.users.find_by_id(session.user_id).await?.is_none() {
            return Err(StorageError::UserNotFound(session.user_id.to_string()));
        }

        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.token) {
            return Err(StorageError::Internal("duplicate session token".to_string()));
        }

        let id = Uuid::new_v4();
        sessions.insert(
            session.token.clone(),
            Session {
                id,
                user_id: session.user_id,
                token: session.token,
                device_info: session.device_info,
                ip_address: session.ip_address,
                created_at: Utc::now(),
                expires_at: session.expires_at,
                is_valid: true,
            },
        );

        Ok(id)
    }

    async fn find_by_token(&self, token: &str) -> StorageResult<Option<(Session, User)>> {
        let Some(session) = self.sessions.read().get(token).cloned() else {
            return Ok(None);
        };

        Ok(self
            .users
            .find_by_id(session.user_id)
            .await?
            .map(|user| (session, user)))
    }

    async fn invalidate(&self, token: &str) -> StorageResult<()> {
        if let Some(session) = self.sessions.write().get_mut(token) {
            session.is_valid = false;
        }
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at >= now);
        Ok((before - sessions.len()) as u64)
    }
}
