use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::context::AuthContext;
use super::error::AuthError;
use super::password::CredentialHasher;
use super::token::TokenCodec;
use crate::storage::{
    CreateUser, NewSession, Session, SessionStore, StorageError, User, UserStore, UserSummary,
};

/// Minimum accepted password length at registration
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Lockout and session lifetime policy
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    /// Failed attempts at which login is refused before checking the password
    pub max_failed_attempts: i32,
    /// Lifetime of both the session row and the token it carries
    pub session_lifetime: Duration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            session_lifetime: Duration::hours(24),
        }
    }
}

/// Registration request
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub role_id: Uuid,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AuthError> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') || email.contains(char::is_whitespace) {
            return Err(AuthError::Validation("A valid email is required".to_string()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(AuthError::Validation(
                "First and last name are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Login request
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Where a login came from, recorded on the session
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
}

/// Successful login: the sanitized user and the issued token
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub user: UserSummary,
    pub token: String,
}

/// Registration, login, logout and token validation over the user and session stores
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    codec: TokenCodec,
    hasher: CredentialHasher,
    policy: AuthPolicy,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        codec: TokenCodec,
        hasher: CredentialHasher,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            users,
            sessions,
            codec,
            hasher,
            policy,
        }
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    /// Create an account. No session is opened.
    pub async fn register(&self, mut request: RegisterRequest) -> Result<Uuid, AuthError> {
        request.validate()?;
        request.email = request.email.trim().to_string();

        if self.users.find_by_email(&request.email).await?.is_some() {
            warn!("Registration attempt for existing email");
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = self.hasher.hash_blocking(request.password).await?;

        let user_id = self
            .users
            .create(CreateUser {
                email: request.email,
                password_hash,
                role_id: request.role_id,
                first_name: request.first_name,
                last_name: request.last_name,
                phone_number: request.phone_number,
            })
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent registration
                StorageError::DuplicateEmail(_) => AuthError::DuplicateEmail,
                StorageError::UnknownRole(_) => AuthError::Validation("Unknown role".to_string()),
                e => AuthError::Storage(e),
            })?;

        info!("Registered user {}", user_id);
        Ok(user_id)
    }

    /// Verify credentials and open a session.
    ///
    /// Lockout is checked before the password, so a locked account is refused even
    /// with the correct password. A mismatch bumps the failed-login counter and a
    /// failure to record it aborts the login.
    pub async fn login(
        &self,
        request: &LoginRequest,
        client: ClientInfo,
    ) -> Result<AuthResponse, AuthError> {
        if request.email.is_empty() || request.password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let Some(user) = self.users.find_by_email(&request.email).await? else {
            warn!("Login attempt for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if user.failed_login_attempts >= self.policy.max_failed_attempts {
            warn!("Login attempt for locked user {}", user.id);
            return Err(AuthError::AccountLocked);
        }

        let matches = self
            .hasher
            .verify_blocking(request.password.clone(), user.password_hash.clone())
            .await?;

        if !matches {
            warn!("Invalid password for user {}", user.id);
            self.users.increment_failed_login(&request.email).await?;
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            warn!("Login attempt for inactive user {}", user.id);
            return Err(AuthError::AccountInactive);
        }

        self.users.record_successful_login(user.id).await?;

        let expires_at = Utc::now()
            .checked_add_signed(self.policy.session_lifetime)
            .ok_or(AuthError::Internal("session expiry out of range"))?;
        let token = self
            .codec
            .issue(user.id, user.role_id, &user.role_name, expires_at)
            .map_err(|_| AuthError::Signing)?;

        let session_id = self
            .sessions
            .create(NewSession {
                user_id: user.id,
                token: token.clone(),
                device_info: client.device_info,
                ip_address: client.ip_address,
                expires_at,
            })
            .await?;

        info!("User {} logged in, session {}", user.id, session_id);

        Ok(AuthResponse {
            user: UserSummary::from(&user),
            token,
        })
    }

    /// Invalidate the session carrying `token`. Unknown or already-invalid sessions
    /// are a silent success.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.sessions.invalidate(token).await?;
        info!("Session logged out");
        Ok(())
    }

    /// Server-side session check: the row must exist, be valid and unexpired
    pub async fn validate_token(&self, token: &str) -> Result<(Session, User), AuthError> {
        let Some((session, user)) = self.sessions.find_by_token(token).await? else {
            return Err(AuthError::SessionNotFound);
        };

        if !session.is_valid {
            return Err(AuthError::SessionInvalid);
        }

        if Utc::now() >= session.expires_at {
            return Err(AuthError::SessionExpired);
        }

        Ok((session, user))
    }

    /// Full check of a bearer token: session row, signature and embedded expiry,
    /// and agreement between the token subject and the session owner
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext, AuthError> {
        let (session, user) = self.validate_token(token).await.inspect_err(|e| {
            warn!("Session rejected: {}", e);
        })?;

        let claims = self.codec.decode(token).map_err(|e| {
            warn!("Token rejected for session {}: {}", session.id, e);
            AuthError::Token(e)
        })?;

        if claims.user_id != session.user_id {
            warn!("Token subject does not match owner of session {}", session.id);
            return Err(AuthError::SubjectMismatch);
        }

        Ok(AuthContext {
            user,
            session,
            claims,
        })
    }

    /// Delete sessions past their expiry
    pub async fn prune_expired_sessions(&self) -> Result<u64, AuthError> {
        Ok(self.sessions.delete_expired(Utc::now()).await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::password::test_hasher;
    use crate::auth::token::TokenError;
    use crate::storage::{MemorySessionStore, MemoryUserStore, StorageResult};
    use async_trait::async_trait;
    use tokio_test::assert_ok;

    pub(crate) const SECRET: &[u8] = b"unit-test-secret-with-enough-length!";

    pub(crate) struct Harness {
        pub users: Arc<MemoryUserStore>,
        pub sessions: Arc<MemorySessionStore>,
        pub service: AuthService,
    }

    pub(crate) fn harness() -> Harness {
        let users = Arc::new(MemoryUserStore::new());
        let sessions = Arc::new(MemorySessionStore::new(users.clone()));
        let service = AuthService::new(
            users.clone(),
            sessions.clone(),
            TokenCodec::new(SECRET),
            test_hasher(),
            AuthPolicy::default(),
        );
        Harness {
            users,
            sessions,
            service,
        }
    }

    pub(crate) fn register_request(users: &MemoryUserStore, email: &str, role: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "pass1234".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Smith".to_string(),
            phone_number: None,
            role_id: users.role_id(role).unwrap(),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_lookup_matches_email() {
        let h = harness();
        let id = h
            .service
            .register(register_request(&h.users, "alice@example.com", "patient"))
            .await
            .unwrap();

        let user = h.users.find_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role_name, "patient");
        assert_ne!(user.password_hash, "pass1234");
        assert!(h.sessions.is_empty());
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let h = harness();
        let request = register_request(&h.users, "alice@example.com", "patient");
        assert_ok!(h.service.register(request.clone()).await);

        let err = h.service.register(request).await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
    }

    #[tokio::test]
    async fn register_rejects_malformed_input() {
        let h = harness();

        let mut request = register_request(&h.users, "not-an-email", "patient");
        assert!(matches!(
            h.service.register(request.clone()).await,
            Err(AuthError::Validation(_))
        ));

        request.email = "alice@example.com".to_string();
        request.password = "short".to_string();
        assert!(matches!(
            h.service.register(request.clone()).await,
            Err(AuthError::Validation(_))
        ));

        request.password = "pass1234".to_string();
        request.role_id = Uuid::new_v4();
        assert!(matches!(
            h.service.register(request).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn login_issues_token_and_session() {
        let h = harness();
        let id = h
            .service
            .register(register_request(&h.users, "alice@example.com", "doctor"))
            .await
            .unwrap();

        let response = h
            .service
            .login(
                &login_request("alice@example.com", "pass1234"),
                ClientInfo {
                    device_info: Some("test-agent".to_string()),
                    ip_address: Some("10.0.0.1".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(response.user.id, id);
        assert_eq!(response.user.role_name, "doctor");

        let (session, user) = h.service.validate_token(&response.token).await.unwrap();
        assert_eq!(session.user_id, id);
        assert_eq!(user.id, id);
        assert_eq!(session.device_info.as_deref(), Some("test-agent"));
        assert_eq!(session.ip_address.as_deref(), Some("10.0.0.1"));

        let lifetime = session.expires_at - session.created_at;
        assert!(lifetime <= Duration::hours(24) && lifetime > Duration::hours(23));

        let ctx = h.service.authenticate(&response.token).await.unwrap();
        assert_eq!(ctx.claims.user_id, id);
        assert_eq!(ctx.claims.role_name, "doctor");
    }

    #[tokio::test]
    async fn sequential_logins_open_independent_sessions() {
        let h = harness();
        assert_ok!(
            h.service
                .register(register_request(&h.users, "alice@example.com", "patient"))
                .await
        );

        let request = login_request("alice@example.com", "pass1234");
        let first = h.service.login(&request, ClientInfo::default()).await.unwrap();
        let second = h.service.login(&request, ClientInfo::default()).await.unwrap();

        assert_ne!(first.token, second.token);
        assert_eq!(h.sessions.len(), 2);
        assert_ok!(h.service.validate_token(&first.token).await);
        assert_ok!(h.service.validate_token(&second.token).await);
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let h = harness();
        assert_ok!(
            h.service
                .register(register_request(&h.users, "alice@example.com", "patient"))
                .await
        );

        let unknown = h
            .service
            .login(&login_request("bob@example.com", "pass1234"), ClientInfo::default())
            .await
            .unwrap_err();
        let wrong = h
            .service
            .login(&login_request("alice@example.com", "wrong-pass"), ClientInfo::default())
            .await
            .unwrap_err();

        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());

        let user = h.users.find_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(user.failed_login_attempts, 1);
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_before_lookup() {
        let h = harness();
        let err = h
            .service
            .login(&login_request("", "pass1234"), ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn lockout_applies_even_to_correct_password() {
        let h = harness();
        assert_ok!(
            h.service
                .register(register_request(&h.users, "alice@example.com", "patient"))
                .await
        );

        for _ in 0..5 {
            let err = h
                .service
                .login(&login_request("alice@example.com", "wrong-pass"), ClientInfo::default())
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }

        let err = h
            .service
            .login(&login_request("alice@example.com", "pass1234"), ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked));
        assert!(h.sessions.is_empty());

        // Operator unlock ends the lockout
        h.users.reset_failed_logins("alice@example.com").await.unwrap();
        assert_ok!(
            h.service
                .login(&login_request("alice@example.com", "pass1234"), ClientInfo::default())
                .await
        );
    }

    #[tokio::test]
    async fn successful_login_resets_failure_count() {
        let h = harness();
        assert_ok!(
            h.service
                .register(register_request(&h.users, "alice@example.com", "patient"))
                .await
        );

        for _ in 0..4 {
            let _ = h
                .service
                .login(&login_request("alice@example.com", "wrong-pass"), ClientInfo::default())
                .await;
        }
        assert_ok!(
            h.service
                .login(&login_request("alice@example.com", "pass1234"), ClientInfo::default())
                .await
        );

        let user = h.users.find_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.last_login.is_some());
    }

    #[tokio::test]
    async fn inactive_account_is_refused_after_password_check() {
        let h = harness();
        assert_ok!(
            h.service
                .register(register_request(&h.users, "alice@example.com", "patient"))
                .await
        );
        h.users.set_active("alice@example.com", false).await.unwrap();

        let err = h
            .service
            .login(&login_request("alice@example.com", "pass1234"), ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountInactive));

        let err = h
            .service
            .login(&login_request("alice@example.com", "wrong-pass"), ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn logout_revokes_before_token_expiry() {
        let h = harness();
        assert_ok!(
            h.service
                .register(register_request(&h.users, "alice@example.com", "patient"))
                .await
        );
        let response = h
            .service
            .login(&login_request("alice@example.com", "pass1234"), ClientInfo::default())
            .await
            .unwrap();

        h.service.logout(&response.token).await.unwrap();

        let err = h.service.validate_token(&response.token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionInvalid));
        let err = h.service.authenticate(&response.token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionInvalid));

        // The token on its own would still pass
        assert_ok!(TokenCodec::new(SECRET).decode(&response.token));

        // Repeated and unknown logouts are silent
        assert_ok!(h.service.logout(&response.token).await);
        assert_ok!(h.service.logout("never-issued").await);
    }

    #[tokio::test]
    async fn unknown_token_is_session_not_found() {
        let h = harness();
        let err = h.service.authenticate("never-issued").await.unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound));
    }

    #[tokio::test]
    async fn expired_session_row_is_rejected() {
        let h = harness();
        let user_id = h
            .service
            .register(register_request(&h.users, "alice@example.com", "patient"))
            .await
            .unwrap();
        let user = h.users.find_by_id(user_id).await.unwrap().unwrap();

        // Token still valid on its own, session row already past expiry
        let token = TokenCodec::new(SECRET)
            .issue(user.id, user.role_id, &user.role_name, Utc::now() + Duration::hours(1))
            .unwrap();
        h.sessions
            .create(NewSession {
                user_id,
                token: token.clone(),
                device_info: None,
                ip_address: None,
                expires_at: Utc::now() - Duration::seconds(1),
            })
            .await
            .unwrap();

        let err = h.service.authenticate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionExpired));

        assert_eq!(h.service.prune_expired_sessions().await.unwrap(), 1);
        let err = h.service.authenticate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound));
    }

    #[tokio::test]
    async fn token_signed_elsewhere_is_rejected_despite_session() {
        let h = harness();
        let user_id = h
            .service
            .register(register_request(&h.users, "alice@example.com", "patient"))
            .await
            .unwrap();
        let user = h.users.find_by_id(user_id).await.unwrap().unwrap();

        let token = TokenCodec::new(b"a-different-secret-of-enough-length")
            .issue(user.id, user.role_id, &user.role_name, Utc::now() + Duration::hours(1))
            .unwrap();
        h.sessions
            .create(NewSession {
                user_id,
                token: token.clone(),
                device_info: None,
                ip_address: None,
                expires_at: Utc::now() + Duration::hours(1),
            })
            .await
            .unwrap();

        let err = h.service.authenticate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::Token(TokenError::SignatureInvalid)));
    }

    #[tokio::test]
    async fn subject_must_match_session_owner() {
        let h = harness();
        let alice = h
            .service
            .register(register_request(&h.users, "alice@example.com", "patient"))
            .await
            .unwrap();
        let bob = h
            .service
            .register(register_request(&h.users, "bob@example.com", "admin"))
            .await
            .unwrap();
        let bob_user = h.users.find_by_id(bob).await.unwrap().unwrap();

        // Bob's claims stored against Alice's session
        let token = TokenCodec::new(SECRET)
            .issue(bob, bob_user.role_id, "admin", Utc::now() + Duration::hours(1))
            .unwrap();
        h.sessions
            .create(NewSession {
                user_id: alice,
                token: token.clone(),
                device_info: None,
                ip_address: None,
                expires_at: Utc::now() + Duration::hours(1),
            })
            .await
            .unwrap();

        let err = h.service.authenticate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::SubjectMismatch));
    }

    #[tokio::test]
    async fn token_past_embedded_expiry_is_rejected_despite_live_session() {
        let h = harness();
        let user_id = h
            .service
            .register(register_request(&h.users, "alice@example.com", "patient"))
            .await
            .unwrap();
        let user = h.users.find_by_id(user_id).await.unwrap().unwrap();

        // Session row still live, token's own exp already elapsed
        let token = TokenCodec::new(SECRET)
            .issue(user.id, user.role_id, &user.role_name, Utc::now() - Duration::seconds(5))
            .unwrap();
        h.sessions
            .create(NewSession {
                user_id,
                token: token.clone(),
                device_info: None,
                ip_address: None,
                expires_at: Utc::now() + Duration::hours(1),
            })
            .await
            .unwrap();

        assert_ok!(h.service.validate_token(&token).await);
        let err = h.service.authenticate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::Token(TokenError::Expired)));
        assert_eq!(err.code(), "TOKEN_EXPIRED");
    }

    #[tokio::test]
    async fn register_trims_email_before_storing() {
        let h = harness();
        assert_ok!(
            h.service
                .register(register_request(&h.users, " alice@example.com ", "patient"))
                .await
        );

        let user = h.users.find_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_ok!(
            h.service
                .login(&login_request("alice@example.com", "pass1234"), ClientInfo::default())
                .await
        );

        let err = h
            .service
            .register(register_request(&h.users, "alice@example.com", "patient"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
    }

    #[tokio::test]
    async fn unrepresentable_session_expiry_fails_without_panicking() {
        let users = Arc::new(MemoryUserStore::new());
        let sessions = Arc::new(MemorySessionStore::new(users.clone()));
        let service = AuthService::new(
            users.clone(),
            sessions.clone(),
            TokenCodec::new(SECRET),
            test_hasher(),
            AuthPolicy {
                max_failed_attempts: 5,
                session_lifetime: Duration::days(100_000_000),
            },
        );
        assert_ok!(
            service
                .register(register_request(&users, "alice@example.com", "patient"))
                .await
        );

        let err = service
            .login(&login_request("alice@example.com", "pass1234"), ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(sessions.is_empty());
    }

    /// Delegates to a memory store but cannot record failed logins
    struct BrokenCounterStore(Arc<MemoryUserStore>);

    #[async_trait]
    impl UserStore for BrokenCounterStore {
        async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
            self.0.find_by_email(email).await
        }
        async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<User>> {
            self.0.find_by_id(id).await
        }
        async fn create(&self, user: CreateUser) -> StorageResult<Uuid> {
            self.0.create(user).await
        }
        async fn increment_failed_login(&self, _email: &str) -> StorageResult<()> {
            Err(StorageError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn record_successful_login(&self, id: Uuid) -> StorageResult<()> {
            self.0.record_successful_login(id).await
        }
        async fn reset_failed_logins(&self, email: &str) -> StorageResult<()> {
            self.0.reset_failed_logins(email).await
        }
        async fn set_active(&self, email: &str, is_active: bool) -> StorageResult<()> {
            self.0.set_active(email, is_active).await
        }
        async fn list(&self) -> StorageResult<Vec<User>> {
            self.0.list().await
        }
    }

    #[tokio::test]
    async fn failure_to_record_mismatch_aborts_with_store_error() {
        let memory = Arc::new(MemoryUserStore::new());
        let sessions = Arc::new(MemorySessionStore::new(memory.clone()));
        let service = AuthService::new(
            Arc::new(BrokenCounterStore(memory.clone())),
            sessions,
            TokenCodec::new(SECRET),
            test_hasher(),
            AuthPolicy::default(),
        );
        assert_ok!(
            service
                .register(register_request(&memory, "alice@example.com", "patient"))
                .await
        );

        let err = service
            .login(&login_request("alice@example.com", "wrong-pass"), ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Storage(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }
}
