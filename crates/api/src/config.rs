use std::time::Duration;

use vidgen_pipeline::PipelineConfig;

use crate::auth::jwt::JwtConfig;

/// Default HTTP request timeout. Longer than the default pipeline stage
/// budget (1320s) so a stage always reports its own timeout before the
/// timeout layer answers 408.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 1380;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development except the
/// JWT secret, which must always be provided.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
    /// How long to wait for in-flight requests to drain after a shutdown
    /// signal before the process exits.
    pub shutdown_timeout_secs: u64,
    pub jwt: JwtConfig,
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `1380`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    ///
    /// JWT settings come from [`JwtConfig::from_env`] and pipeline
    /// settings from [`PipelineConfig::from_env`].
    ///
    /// # Panics
    ///
    /// Panics on any unparseable value.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_REQUEST_TIMEOUT_SECS.to_string())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let config = Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt: JwtConfig::from_env(),
            pipeline: PipelineConfig::from_env(),
        };

        if !config.request_timeout_covers_pipeline() {
            tracing::warn!(
                request_timeout_secs = config.request_timeout_secs,
                stage_budget_secs = config.pipeline.stage_budget().as_secs(),
                "REQUEST_TIMEOUT_SECS is shorter than the pipeline stage budget; \
                 slow generations may be cut off with 408 instead of a stage error",
            );
        }

        config
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether the HTTP timeout outlasts every stage deadline of one
    /// generation run back to back.
    pub fn request_timeout_covers_pipeline(&self) -> bool {
        self.request_timeout() > self.pipeline.stage_budget()
    }
}
