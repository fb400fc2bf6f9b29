use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use vidgen_pipeline::GenerationPipeline;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind an `Arc` or is already a handle.
#[derive(Clone)]
pub struct AppState {
    pub pool: vidgen_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// One pipeline instance serves every concurrent generation request.
    pub pipeline: Arc<GenerationPipeline>,
    /// Cancelled when the server begins shutting down. Each generation
    /// waits on a child token so in-flight completion waits end promptly.
    pub shutdown: CancellationToken,
}
