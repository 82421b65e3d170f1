use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use super::traits::{StorageError, StorageResult, UserStore};

/// Roles seeded on first start
pub const DEFAULT_ROLES: [(&str, &str); 4] = [
    ("admin", "Full administrative access"),
    ("doctor", "Treating physician"),
    ("patient", "Monitored patient"),
    ("family_member", "Relative with read access to a patient"),
];

/// User account in the system
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role_id: Uuid,
    /// Denormalized from the roles table for fast role checks
    pub role_name: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub is_active: bool,
    pub failed_login_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// User creation request
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub password_hash: String,
    pub role_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
}

/// Public view of a user. Never carries the password hash or lockout state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub role_id: Uuid,
    pub role_name: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role_id: user.role_id,
            role_name: user.role_name.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone_number: user.phone_number.clone(),
            is_active: user.is_active,
            last_login: user.last_login,
        }
    }
}

pub(crate) const USER_COLUMNS: &str = r#"
    u.id, u.email, u.password_hash, u.role_id, r.name AS role_name,
    u.first_name, u.last_name, u.phone_number, u.is_active,
    u.failed_login_attempts, u.created_at, u.last_login
"#;

pub(crate) fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role_id: row.get("role_id"),
        role_name: row.get("role_name"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        phone_number: row.get("phone_number"),
        is_active: row.get("is_active"),
        failed_login_attempts: row.get("failed_login_attempts"),
        created_at: row.get("created_at"),
        last_login: row.get("last_login"),
    }
}

/// PostgreSQL implementation of UserStore
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize database schema for roles and users
    pub async fn initialize(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS roles (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                name VARCHAR(64) UNIQUE NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                email VARCHAR(255) UNIQUE NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                role_id UUID NOT NULL REFERENCES roles(id),
                first_name VARCHAR(255) NOT NULL,
                last_name VARCHAR(255) NOT NULL,
                phone_number VARCHAR(32),
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                failed_login_attempts INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                last_login TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (name, description) in DEFAULT_ROLES {
            sqlx::query(
                r#"
                INSERT INTO roles (name, description) VALUES ($1, $2)
                ON CONFLICT (name) DO NOTHING
                "#,
            )
            .bind(name)
            .bind(description)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Resolve a role name to its id
    pub async fn role_id(&self, name: &str) -> StorageResult<Uuid> {
        let row = sqlx::query("SELECT id FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::UnknownRole(name.to_string()))?;

        Ok(row.get("id"))
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users u JOIN roles r ON r.id = u.role_id WHERE u.email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users u JOIN roles r ON r.id = u.role_id WHERE u.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn create(&self, user: CreateUser) -> StorageResult<Uuid> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, role_id, first_name, last_name, phone_number)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role_id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone_number)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return StorageError::DuplicateEmail(user.email.clone());
                }
                if db_err.is_foreign_key_violation() {
                    return StorageError::UnknownRole(user.role_id.to_string());
                }
            }
            StorageError::Database(e)
        })?;

        Ok(row.get("id"))
    }

    async fn increment_failed_login(&self, email: &str) -> StorageResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = failed_login_attempts + 1, updated_at = NOW()
            WHERE email = $1
            "#,
        )
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_successful_login(&self, id: Uuid) -> StorageResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = 0, last_login = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reset_failed_logins(&self, email: &str) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET failed_login_attempts = 0, updated_at = NOW() WHERE email = $1
            "#,
        )
        .bind(email)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::UserNotFound(email.to_string()));
        }

        Ok(())
    }

    async fn set_active(&self, email: &str, is_active: bool) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET is_active = $2, updated_at = NOW() WHERE email = $1
            "#,
        )
        .bind(email)
        .bind(is_active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::UserNotFound(email.to_string()));
        }

        Ok(())
    }

    async fn list(&self) -> StorageResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users u JOIN roles r ON r.id = u.role_id ORDER BY u.created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(user_from_row).collect())
    }
}
