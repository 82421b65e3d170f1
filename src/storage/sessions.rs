use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::traits::{SessionStore, StorageResult};
use super::users::{user_from_row, User, USER_COLUMNS};

/// A persisted login session. The token doubles as the lookup key.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip)]
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_valid: bool,
}

impl Session {
    /// Usable only while flagged valid and not yet past its expiry
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_valid && now < self.expires_at
    }
}

/// Session creation request
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub token: String,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// PostgreSQL implementation of SessionStore
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize database schema for sessions. Requires the users table.
    pub async fn initialize(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token TEXT UNIQUE NOT NULL,
                device_info TEXT,
                ip_address VARCHAR(64),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                expires_at TIMESTAMPTZ NOT NULL,
                is_valid BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn create(&self, session: NewSession) -> StorageResult<Uuid> {
        let row = sqlx::query(
            r#"
            INSERT INTO sessions (user_id, token, device_info, ip_address, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(session.user_id)
        .bind(&session.token)
        .bind(&session.device_info)
        .bind(&session.ip_address)
        .bind(session.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    async fn find_by_token(&self, token: &str) -> StorageResult<Option<(Session, User)>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT s.id AS session_id, s.device_info, s.ip_address,
                   s.created_at AS session_created_at, s.expires_at, s.is_valid,
                   {USER_COLUMNS}
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            JOIN roles r ON r.id = u.role_id
            WHERE s.token = $1
            "#
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let user = user_from_row(&row);
            let session = Session {
                id: row.get("session_id"),
                user_id: user.id,
                token: token.to_string(),
                device_info: row.get("device_info"),
                ip_address: row.get("ip_address"),
                created_at: row.get("session_created_at"),
                expires_at: row.get("expires_at"),
                is_valid: row.get("is_valid"),
            };
            (session, user)
        }))
    }

    async fn invalidate(&self, token: &str) -> StorageResult<()> {
        sqlx::query(
            r#"
            UPDATE sessions SET is_valid = FALSE WHERE token = $1 AND is_valid
            "#,
        )
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
