#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use vidgen_api::auth::jwt::JwtConfig;
use vidgen_api::auth::password::hash_password;
use vidgen_api::config::ServerConfig;
use vidgen_api::state::AppState;
use vidgen_db::models::user::{CreateUser, User};
use vidgen_db::repositories::UserRepo;
use vidgen_pipeline::config::{CompletionStrategy, MetadataSource};
use vidgen_pipeline::{GenerationPipeline, PipelineConfig};

pub const TEST_PASSWORD: &str = "test_password_123!";
const BOUNDARY: &str = "vidgen-test-boundary";

/// Pipeline settings pointing at `engine_url`, polling fast and reading
/// metadata from the engine echo so no ffprobe binary is needed.
pub fn test_pipeline_config(engine_url: &str) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.comfyui_url = engine_url.to_string();
    config.comfyui_ws_url = engine_url.replacen("http", "ws", 1);
    config.public_url = "http://engine.example".to_string();
    config.template_path =
        PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../workflows/video_generation.json"));
    config.completion.strategy = CompletionStrategy::Polling;
    config.completion.poll_interval = Duration::from_millis(20);
    config.completion.timeout = Duration::from_secs(5);
    config.metadata_source = MetadataSource::Engine;
    config.engine_request_timeout = Duration::from_secs(5);
    config.probe_timeout = Duration::from_secs(5);
    config
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(pipeline: PipelineConfig) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        jwt: JwtConfig {
            secret: "integration-test-secret".to_string(),
            access_token_expiry_mins: 30,
        },
        pipeline,
    }
}

/// Build the full application router against `pool` and an engine at
/// `engine_url` (usually a wiremock server).
pub fn build_test_app_with(pool: PgPool, pipeline: PipelineConfig) -> Router {
    let engine = GenerationPipeline::new(&pipeline).expect("pipeline should build");
    let state = AppState {
        pool,
        config: Arc::new(test_config(pipeline)),
        pipeline: Arc::new(engine),
        shutdown: CancellationToken::new(),
    };
    vidgen_api::app::build_router(state)
}

/// Router whose engine is unreachable; fine for tests that never generate.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with(pool, test_pipeline_config("http://127.0.0.1:9"))
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// One multipart part: `(name, filename, content_type, bytes)`.
pub type Part<'a> = (&'a str, Option<&'a str>, Option<&'a str>, &'a [u8]);

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, content_type, bytes) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match filename {
            Some(f) => format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n"),
            None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n"),
        };
        body.extend_from_slice(disposition.as_bytes());
        if let Some(ct) = content_type {
            body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart_auth(
    app: Router,
    uri: &str,
    token: Option<&str>,
    parts: &[Part<'_>],
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    send(app, builder.body(Body::from(multipart_body(parts))).unwrap()).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Insert a user directly; the plaintext password is [`TEST_PASSWORD`].
pub async fn create_user(pool: &PgPool, username: &str) -> User {
    let input = CreateUser {
        username: username.to_string(),
        email: format!("{username}@test.com"),
        password_hash: hash_password(TEST_PASSWORD).expect("hashing should succeed"),
    };
    UserRepo::create(pool, &input)
        .await
        .expect("user creation should succeed")
}

/// Log `user` in through the API and return the bearer token.
pub async fn login(app: Router, user: &User) -> String {
    let body = serde_json::json!({ "email": user.email, "password": TEST_PASSWORD });
    let response = post_json(app, "/api/v1/auth/login", body).await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    body_json(response).await["access_token"]
        .as_str()
        .expect("access_token")
        .to_string()
}
