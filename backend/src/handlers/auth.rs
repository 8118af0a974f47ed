//! Authentication handlers

use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::auth::{LoginInput, LoginResponse, UserProfile};
use crate::services::AuthService;
use crate::AppState;

/// Login endpoint handler
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginInput>,
) -> AppResult<Json<LoginResponse>> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let response = auth_service.login(body).await?;
    Ok(Json(response))
}

/// Profile of the authenticated user
pub async fn me(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<UserProfile>> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let profile = auth_service.profile(current_user.0.user_id).await?;
    Ok(Json(profile))
}
