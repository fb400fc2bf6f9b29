//! HTTP-level tests for `/videos`, driving the pipeline against a mock
//! ComfyUI server.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{body_json, create_user, get_auth, login, post_multipart_auth};
use serde_json::{json, Value};
use sqlx::PgPool;
use vidgen_db::models::generated_video::CreateGeneratedVideo;
use vidgen_db::repositories::GeneratedVideoRepo;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE: &str = "/api/v1/videos/generate";

fn finished_history(prompt_id: &str) -> Value {
    json!({
        prompt_id: {
            "outputs": {
                "9": {"gifs": [{
                    "filename": "wan_00001.mp4", "subfolder": "", "type": "output",
                    "width": 832, "height": 480, "frame_rate": 16, "frame_count": 81
                }]}
            },
            "status": {"status_str": "success", "completed": true, "messages": []}
        }
    })
}

async fn mount_submit(server: &MockServer, expected_prompt: Value, prompt_id: &str) {
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .and(body_partial_json(json!({ "prompt": expected_prompt })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "prompt_id": prompt_id, "number": 1, "node_errors": {}
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_history(server: &MockServer, prompt_id: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/history/{prompt_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn stored_video(user_id: i64, job_id: &str) -> CreateGeneratedVideo {
    CreateGeneratedVideo {
        user_id,
        job_id: job_id.to_string(),
        input_asset_ref: None,
        positive_prompt: "a lighthouse at dusk".to_string(),
        negative_prompt: String::new(),
        output_filename: format!("{job_id}.mp4"),
        output_subfolder: None,
        output_kind: "video".to_string(),
        output_url: format!("http://engine.example/view?filename={job_id}.mp4&subfolder=&type=output"),
        width: 512,
        height: 512,
        frame_rate: Some(24.0),
        duration_secs: Some(2.0),
        resolution: "512x512".to_string(),
        codec: Some("h264".to_string()),
        metadata_source: "probe".to_string(),
        created_at: chrono::Utc::now(),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_generate_from_prompts_persists_record(pool: PgPool) {
    let server = MockServer::start().await;
    mount_submit(
        &server,
        json!({"6": {"inputs": {"text": "a cat walking"}}, "7": {"inputs": {"text": ""}}}),
        "p-1",
    )
    .await;
    mount_history(&server, "p-1", finished_history("p-1")).await;

    let user = create_user(&pool, "maker").await;
    let app = common::build_test_app_with(pool.clone(), common::test_pipeline_config(&server.uri()));
    let token = login(app.clone(), &user).await;

    let response = post_multipart_auth(
        app,
        GENERATE,
        Some(&token),
        &[("positive_prompt", None, None, "a cat walking".as_bytes())],
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let data = body_json(response).await["data"].clone();
    assert_eq!(data["user_id"], user.id);
    assert_eq!(data["job_id"], "p-1");
    assert_eq!(data["output_filename"], "wan_00001.mp4");
    assert_eq!(data["output_kind"], "animation");
    assert_eq!(data["resolution"], "832x480");
    assert_eq!(data["frame_rate"], 16.0);
    assert_eq!(data["duration_secs"], 5.0625);
    assert_eq!(data["metadata_source"], "engine");
    assert_eq!(data["input_asset_ref"], Value::Null);
    assert_eq!(
        data["output_url"],
        "http://engine.example/view?filename=wan_00001.mp4&subfolder=&type=output"
    );

    let stored = GeneratedVideoRepo::list_by_user(&pool, user.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].positive_prompt, "a cat walking");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_prompts_reach_the_engine_verbatim(pool: PgPool) {
    let server = MockServer::start().await;
    mount_submit(
        &server,
        json!({
            "6": {"inputs": {"text": "  a cat walking\n"}},
            "7": {"inputs": {"text": " blurry "}}
        }),
        "p-raw",
    )
    .await;
    mount_history(&server, "p-raw", finished_history("p-raw")).await;

    let user = create_user(&pool, "verbatim").await;
    let app = common::build_test_app_with(pool.clone(), common::test_pipeline_config(&server.uri()));
    let token = login(app.clone(), &user).await;

    let response = post_multipart_auth(
        app,
        GENERATE,
        Some(&token),
        &[
            ("positive_prompt", None, None, "  a cat walking\n".as_bytes()),
            ("negative_prompt", None, None, " blurry ".as_bytes()),
        ],
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let stored = GeneratedVideoRepo::list_by_user(&pool, user.id).await.unwrap();
    assert_eq!(stored[0].positive_prompt, "  a cat walking\n");
    assert_eq!(stored[0].negative_prompt, " blurry ");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_generate_with_image_uploads_and_injects_reference(pool: PgPool) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "abc_start.png", "subfolder": "", "type": "input"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_submit(
        &server,
        json!({"1206": {"inputs": {"image": "abc_start.png"}}, "7": {"inputs": {"text": "blurry"}}}),
        "p-2",
    )
    .await;
    mount_history(&server, "p-2", finished_history("p-2")).await;

    let user = create_user(&pool, "imager").await;
    let app = common::build_test_app_with(pool, common::test_pipeline_config(&server.uri()));
    let token = login(app.clone(), &user).await;

    let response = post_multipart_auth(
        app,
        GENERATE,
        Some(&token),
        &[
            ("positive_prompt", None, None, "a dancer".as_bytes()),
            ("negative_prompt", None, None, "blurry".as_bytes()),
            ("image", Some("start.png"), Some("image/png"), &b"\x89PNG\r\n\x1a\nfake"[..]),
        ],
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let data = body_json(response).await["data"].clone();
    assert_eq!(data["input_asset_ref"], "abc_start.png");
    assert_eq!(data["negative_prompt"], "blurry");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_generate_rejects_non_image_upload_before_engine(pool: PgPool) {
    let server = MockServer::start().await;
    let user = create_user(&pool, "sneaky").await;
    let app = common::build_test_app_with(pool, common::test_pipeline_config(&server.uri()));
    let token = login(app.clone(), &user).await;

    let response = post_multipart_auth(
        app,
        GENERATE,
        Some(&token),
        &[
            ("positive_prompt", None, None, "a cat".as_bytes()),
            ("image", Some("clip.mp4"), Some("video/mp4"), "not an image".as_bytes()),
        ],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_generate_requires_positive_prompt_and_auth(pool: PgPool) {
    let user = create_user(&pool, "empty").await;
    let app = common::build_test_app(pool);
    let token = login(app.clone(), &user).await;

    let response = post_multipart_auth(
        app.clone(),
        GENERATE,
        Some(&token),
        &[("positive_prompt", None, None, "   ".as_bytes())],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_multipart_auth(
        app,
        GENERATE,
        None,
        &[("positive_prompt", None, None, "a cat".as_bytes())],
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_engine_job_failure_is_stage_tagged_bad_gateway(pool: PgPool) {
    let server = MockServer::start().await;
    mount_submit(&server, json!({}), "p-3").await;
    mount_history(
        &server,
        "p-3",
        json!({"p-3": {
            "outputs": {},
            "status": {
                "status_str": "error",
                "completed": false,
                "messages": [["execution_error", {
                    "prompt_id": "p-3", "node_id": "3",
                    "exception_message": "CUDA out of memory"
                }]]
            }
        }}),
    )
    .await;

    let user = create_user(&pool, "unlucky").await;
    let app = common::build_test_app_with(pool.clone(), common::test_pipeline_config(&server.uri()));
    let token = login(app.clone(), &user).await;

    let response = post_multipart_auth(
        app,
        GENERATE,
        Some(&token),
        &[("positive_prompt", None, None, "a cat".as_bytes())],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "GENERATION_FAILED");
    assert_eq!(json["stage"], "wait");
    assert_eq!(json["kind"], "job_failed");
    assert!(json["error"].as_str().unwrap().contains("CUDA out of memory"));

    assert!(GeneratedVideoRepo::list_by_user(&pool, user.id).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_completion_timeout_is_gateway_timeout(pool: PgPool) {
    let server = MockServer::start().await;
    mount_submit(&server, json!({}), "p-4").await;
    mount_history(&server, "p-4", json!({})).await;

    let mut pipeline = common::test_pipeline_config(&server.uri());
    pipeline.completion.timeout = Duration::from_millis(300);

    let user = create_user(&pool, "patient").await;
    let app = common::build_test_app_with(pool, pipeline);
    let token = login(app.clone(), &user).await;

    let response = post_multipart_auth(
        app,
        GENERATE,
        Some(&token),
        &[("positive_prompt", None, None, "a cat".as_bytes())],
    )
    .await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let json = body_json(response).await;
    assert_eq!(json["stage"], "wait");
    assert_eq!(json["kind"], "completion_timeout");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_videos_are_scoped_to_their_owner(pool: PgPool) {
    let owner = create_user(&pool, "owner").await;
    let stranger = create_user(&pool, "stranger").await;
    let video = GeneratedVideoRepo::create(&pool, &stored_video(owner.id, "job-a"))
        .await
        .unwrap();
    GeneratedVideoRepo::create(&pool, &stored_video(stranger.id, "job-b"))
        .await
        .unwrap();

    let app = common::build_test_app(pool);
    let owner_token = login(app.clone(), &owner).await;
    let stranger_token = login(app.clone(), &stranger).await;
    let video_path = format!("/api/v1/videos/{}", video.id);

    let response = get_auth(app.clone(), "/api/v1/videos", &owner_token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = body_json(response).await["data"].clone();
    let jobs: Vec<&str> = data
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["job_id"].as_str().unwrap())
        .collect();
    assert_eq!(jobs, vec!["job-a"]);

    let response = get_auth(app.clone(), &video_path, &owner_token).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["id"], video.id);

    let response = get_auth(app.clone(), &video_path, &stranger_token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get_auth(app, "/api/v1/videos/999999", &owner_token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
