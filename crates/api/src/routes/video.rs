use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::video;
use crate::state::AppState;

/// Routes mounted at `/videos`. All require auth.
///
/// ```text
/// GET  /          -> list
/// POST /generate  -> generate (multipart)
/// GET  /{id}      -> get_by_id
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(video::list))
        .route(
            "/generate",
            post(video::generate).layer(DefaultBodyLimit::max(video::MAX_GENERATE_BODY_BYTES)),
        )
        .route("/{id}", get(video::get_by_id))
}
