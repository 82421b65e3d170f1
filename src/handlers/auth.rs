use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::auth::{
    AuthContext, AuthError, AuthResponse, ClientInfo, LoginRequest, RegisterRequest, AUTH_COOKIE,
};
use crate::state::ServerState;
use crate::storage::UserSummary;

/// Registration response
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Session validation response
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub message: String,
    pub user: UserSummary,
}

fn body_or_validation<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        warn!("Rejected request body: {}", rejection.body_text());
        AuthError::Validation("Invalid request body".to_string())
    })
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let device_info = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
            .map(|ip| ip.to_string());

        let ip_address = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(ClientInfo {
            device_info,
            ip_address,
        })
    }
}

/// Registration endpoint
pub async fn register(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    let request = body_or_validation(body)?;
    let user_id = state.auth.register(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user_id,
        }),
    ))
}

/// Login endpoint. The token is returned in the body and set as an HttpOnly cookie.
pub async fn login(
    State(state): State<Arc<ServerState>>,
    client: ClientInfo,
    jar: CookieJar,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<AuthResponse>), AuthError> {
    let request = body_or_validation(body)?;
    let response = state.auth.login(&request, client).await?;

    let max_age = time::Duration::seconds(state.auth.policy().session_lifetime.num_seconds());
    let cookie = Cookie::build((AUTH_COOKIE, format!("Bearer {}", response.token)))
        .path("/")
        .http_only(true)
        .secure(state.config.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(max_age);

    Ok((jar.add(cookie), Json(response)))
}

/// Logout endpoint. Invalidates the session the request authenticated with.
pub async fn logout(
    State(state): State<Arc<ServerState>>,
    ctx: AuthContext,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), AuthError> {
    state.auth.logout(ctx.token()).await?;

    let jar = jar.remove(Cookie::build(AUTH_COOKIE).path("/"));
    Ok((
        jar,
        Json(MessageResponse {
            message: "Successfully logged out".to_string(),
        }),
    ))
}

/// Session validation endpoint
pub async fn validate_session(ctx: AuthContext) -> Json<ValidateResponse> {
    Json(ValidateResponse {
        message: "Token is valid".to_string(),
        user: UserSummary::from(&ctx.user),
    })
}
