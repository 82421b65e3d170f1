use axum::{extract::State, Json};
use std::sync::Arc;

use crate::auth::{AuthContext, AuthError};
use crate::state::ServerState;
use crate::storage::UserSummary;

/// Profile of the authenticated caller
pub async fn profile(ctx: AuthContext) -> Json<UserSummary> {
    Json(UserSummary::from(&ctx.user))
}

/// All users, for administrators
pub async fn list_users(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<UserSummary>>, AuthError> {
    let users = state.user_store.list().await?;
    Ok(Json(users.iter().map(UserSummary::from).collect()))
}
