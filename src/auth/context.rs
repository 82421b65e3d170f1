//! Typed identity attached to authenticated requests.
//!
//! The auth middleware inserts an [`AuthContext`] into the request extensions;
//! handlers take it as an extractor:
//!
//! ```rust,ignore
//! async fn profile(ctx: AuthContext) -> Json<UserSummary> {
//!     Json(UserSummary::from(&ctx.user))
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::error::AuthError;
use super::token::Claims;
use crate::storage::{Session, User};

/// Resolved identity of the caller
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub session: Session,
    pub claims: Claims,
}

impl AuthContext {
    /// The raw bearer token this request authenticated with
    pub fn token(&self) -> &str {
        &self.session.token
    }

    pub fn has_role(&self, allowed: &[String]) -> bool {
        allowed.iter().any(|role| *role == self.user.role_name)
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Absent only when a route is mounted without the auth middleware
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingIdentity)
    }
}
