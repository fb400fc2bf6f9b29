//! Generated-video record model and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use vidgen_core::types::{DbId, Timestamp};

/// One persisted generation result, owned by the requesting user.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GeneratedVideo {
    pub id: DbId,
    pub user_id: DbId,
    /// Engine job identifier the artifact came from.
    pub job_id: String,
    pub input_asset_ref: Option<String>,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub output_filename: String,
    pub output_subfolder: Option<String>,
    /// `video`, `animation` or `image`.
    pub output_kind: String,
    pub output_url: String,
    pub width: i32,
    pub height: i32,
    pub frame_rate: Option<f64>,
    pub duration_secs: Option<f64>,
    pub resolution: String,
    pub codec: Option<String>,
    /// `probe` or `engine`.
    pub metadata_source: String,
    pub created_at: Timestamp,
}

/// DTO for inserting a generated-video record.
#[derive(Debug, Clone)]
pub struct CreateGeneratedVideo {
    pub user_id: DbId,
    pub job_id: String,
    pub input_asset_ref: Option<String>,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub output_filename: String,
    pub output_subfolder: Option<String>,
    pub output_kind: String,
    pub output_url: String,
    pub width: i32,
    pub height: i32,
    pub frame_rate: Option<f64>,
    pub duration_secs: Option<f64>,
    pub resolution: String,
    pub codec: Option<String>,
    pub metadata_source: String,
    pub created_at: Timestamp,
}
