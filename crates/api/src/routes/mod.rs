pub mod auth;
pub mod health;
pub mod user;
pub mod video;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /auth/register                                   register (public)
/// /auth/login                                      login (public)
///
/// /users/me                                        current user
/// /users/{id}                                      get user
///
/// /videos                                          list caller's videos
/// /videos/generate                                 run a generation (multipart POST)
/// /videos/{id}                                     get one of the caller's videos
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", user::router())
        .nest("/videos", video::router())
}
