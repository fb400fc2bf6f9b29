//! Handlers for the `/videos` resource.
//!
//! `POST /videos/generate` runs the generation pipeline inline and
//! persists the result for the authenticated user. Listing and lookup are
//! scoped to the caller: another user's record is reported as missing.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use vidgen_core::error::CoreError;
use vidgen_core::types::DbId;
use vidgen_db::models::generated_video::{CreateGeneratedVideo, GeneratedVideo};
use vidgen_db::repositories::GeneratedVideoRepo;
use vidgen_pipeline::upload::InputAsset;
use vidgen_pipeline::{GenerationRequest, GenerationResult};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Upper bound on the multipart body of a generation request.
pub const MAX_GENERATE_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Fallback name for an image part sent without a filename.
const DEFAULT_IMAGE_NAME: &str = "input.png";

/// POST /api/v1/videos/generate
///
/// Multipart fields: `positive_prompt` (required), `negative_prompt`
/// (optional, defaults to empty) and `image` (optional file, `image/*`).
pub async fn generate(
    State(state): State<AppState>,
    auth: AuthUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<GeneratedVideo>>)> {
    let request = read_generate_form(auth.user_id, multipart).await?;

    tracing::info!(
        user_id = auth.user_id,
        has_image = request.input_asset.is_some(),
        "Generation requested",
    );

    let cancel = state.shutdown.child_token();
    let result = state.pipeline.run(&request, &cancel).await?;

    let input = record_from_result(&request, &result)?;
    let video = GeneratedVideoRepo::create(&state.pool, &input).await?;

    tracing::info!(
        user_id = auth.user_id,
        video_id = video.id,
        job_id = %video.job_id,
        "Generated video recorded",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: video })))
}

/// GET /api/v1/videos
pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<DataResponse<Vec<GeneratedVideo>>>> {
    let videos = GeneratedVideoRepo::list_by_user(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data: videos }))
}

/// GET /api/v1/videos/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<GeneratedVideo>>> {
    let video = GeneratedVideoRepo::find_by_id(&state.pool, id)
        .await?
        .filter(|v| v.user_id == auth.user_id)
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "GeneratedVideo",
            id,
        }))?;
    Ok(Json(DataResponse { data: video }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn read_generate_form(user_id: DbId, mut multipart: Multipart) -> AppResult<GenerationRequest> {
    let mut positive_prompt: Option<String> = None;
    let mut negative_prompt = String::new();
    let mut input_asset: Option<InputAsset> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "positive_prompt" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                positive_prompt = Some(text);
            }
            "negative_prompt" => {
                negative_prompt = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
            }
            "image" => {
                let filename = field
                    .file_name()
                    .filter(|n| !n.is_empty())
                    .unwrap_or(DEFAULT_IMAGE_NAME)
                    .to_string();
                let content_type = field.content_type().unwrap_or("").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;

                // Browsers submit an empty part for an untouched file input.
                if bytes.is_empty() {
                    continue;
                }
                if !is_image_content_type(&content_type) {
                    return Err(AppError::Core(CoreError::Validation(format!(
                        "image must have an image/* content type, got '{content_type}'"
                    ))));
                }
                input_asset = Some(InputAsset {
                    bytes: bytes.to_vec(),
                    filename,
                    content_type,
                });
            }
            _ => {}
        }
    }

    Ok(GenerationRequest {
        user_id,
        positive_prompt: required_prompt(positive_prompt)?,
        negative_prompt,
        input_asset,
    })
}

/// The positive prompt exactly as sent; whitespace-only counts as absent.
fn required_prompt(raw: Option<String>) -> AppResult<String> {
    raw.filter(|p| !p.trim().is_empty()).ok_or_else(|| {
        AppError::Core(CoreError::Validation(
            "positive_prompt is required".into(),
        ))
    })
}

fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
        && content_type.len() > 6
}

/// Map a pipeline result onto the persisted record.
fn record_from_result(
    request: &GenerationRequest,
    result: &GenerationResult,
) -> AppResult<CreateGeneratedVideo> {
    let dimension = |value: u32, field: &str| {
        i32::try_from(value)
            .map_err(|_| AppError::InternalError(format!("{field} {value} does not fit the record")))
    };

    Ok(CreateGeneratedVideo {
        user_id: request.user_id,
        job_id: result.job_id.clone(),
        input_asset_ref: result.input_asset_ref.clone(),
        positive_prompt: request.positive_prompt.clone(),
        negative_prompt: request.negative_prompt.clone(),
        output_filename: result.output_filename.clone(),
        output_subfolder: result.output_subfolder.clone(),
        output_kind: result.output_kind.as_str().to_string(),
        output_url: result.output_url.clone(),
        width: dimension(result.metadata.width, "width")?,
        height: dimension(result.metadata.height, "height")?,
        frame_rate: result.metadata.frame_rate,
        duration_secs: result.metadata.duration_secs,
        resolution: result.metadata.resolution.clone(),
        codec: result.metadata.codec.clone(),
        metadata_source: result.metadata_source.as_str().to_string(),
        created_at: result.created_at,
    })
}
