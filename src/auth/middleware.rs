use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use tracing::warn;

use super::context::AuthContext;
use super::error::AuthError;
use super::service::AuthService;

/// Cookie carrying `Bearer <token>` after login
pub const AUTH_COOKIE: &str = "Authorization";

/// Split a carrier value into its token. Exactly `Bearer <token>` is accepted.
pub fn parse_bearer(value: &str) -> Result<&str, AuthError> {
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(AuthError::InvalidAuthorizationFormat),
    }
}

/// Pull the bearer token from the `Authorization` header, falling back to the
/// `Authorization` cookie
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| AuthError::InvalidAuthorizationFormat)?;
        return parse_bearer(value).map(str::to_string);
    }

    let jar = CookieJar::from_headers(headers);
    match jar.get(AUTH_COOKIE) {
        Some(cookie) if !cookie.value().is_empty() => {
            parse_bearer(cookie.value()).map(str::to_string)
        }
        _ => Err(AuthError::MissingToken),
    }
}

/// Authentication gate for protected routes.
///
/// Resolves the caller through [`AuthService::authenticate`] and attaches the
/// [`AuthContext`] for downstream handlers. Every failure is terminal.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match extract_bearer_token(request.headers()) {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    match auth.authenticate(&token).await {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Role allow-list bound to a route group
#[derive(Debug, Clone)]
pub struct AllowedRoles(Arc<[String]>);

impl AllowedRoles {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }
}

/// Authorization gate. Must run after [`auth_middleware`].
pub async fn require_role(
    State(allowed): State<AllowedRoles>,
    request: Request,
    next: Next,
) -> Response {
    let permitted = match request.extensions().get::<AuthContext>() {
        Some(ctx) => {
            let permitted = ctx.has_role(&allowed.0);
            if !permitted {
                warn!(
                    "User {} with role {} denied, requires one of {:?}",
                    ctx.user.id, ctx.user.role_name, allowed.0
                );
            }
            permitted
        }
        None => return AuthError::MissingIdentity.into_response(),
    };

    if permitted {
        next.run(request).await
    } else {
        AuthError::Forbidden.into_response()
    }
}
