//! Repository for the `generated_videos` table.
//!
//! Records are append-only: there is no update or delete path.

use sqlx::PgPool;
use vidgen_core::types::DbId;

use crate::models::generated_video::{CreateGeneratedVideo, GeneratedVideo};

const COLUMNS: &str = "id, user_id, job_id, input_asset_ref, positive_prompt, negative_prompt, \
                       output_filename, output_subfolder, output_kind, output_url, width, height, \
                       frame_rate, duration_secs, resolution, codec, metadata_source, created_at";

pub struct GeneratedVideoRepo;

impl GeneratedVideoRepo {
    /// Insert a record, returning the stored row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateGeneratedVideo,
    ) -> Result<GeneratedVideo, sqlx::Error> {
        let query = format!(
            "INSERT INTO generated_videos (
                user_id, job_id, input_asset_ref, positive_prompt, negative_prompt,
                output_filename, output_subfolder, output_kind, output_url, width, height,
                frame_rate, duration_secs, resolution, codec, metadata_source, created_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(input.user_id)
            .bind(&input.job_id)
            .bind(&input.input_asset_ref)
            .bind(&input.positive_prompt)
            .bind(&input.negative_prompt)
            .bind(&input.output_filename)
            .bind(&input.output_subfolder)
            .bind(&input.output_kind)
            .bind(&input.output_url)
            .bind(input.width)
            .bind(input.height)
            .bind(input.frame_rate)
            .bind(input.duration_secs)
            .bind(&input.resolution)
            .bind(&input.codec)
            .bind(&input.metadata_source)
            .bind(input.created_at)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<GeneratedVideo>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generated_videos WHERE id = $1");
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's records, newest first.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<GeneratedVideo>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generated_videos
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }
}
