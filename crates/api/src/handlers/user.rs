//! Handlers for the `/users` resource.

use axum::extract::{Path, State};
use axum::Json;
use vidgen_core::error::CoreError;
use vidgen_core::types::DbId;
use vidgen_db::models::user::UserResponse;
use vidgen_db::repositories::UserRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// GET /api/v1/users/me
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<UserResponse>> {
    get_user(&state, auth.user_id).await
}

/// GET /api/v1/users/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<UserResponse>> {
    get_user(&state, id).await
}

async fn get_user(state: &AppState, id: DbId) -> AppResult<Json<UserResponse>> {
    let user = UserRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "User", id }))?;
    Ok(Json(user.into()))
}
