//! Composes the pipeline stages into one call.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use vidgen_comfyui::api::ComfyUIApi;
use vidgen_comfyui::client::ComfyUIClient;
use vidgen_core::media::VideoMetadata;
use vidgen_core::types::{DbId, Timestamp};

use crate::config::{MetadataSource, OutputPolicy, PipelineConfig};
use crate::engine::{EngineApi, EventChannel, FfprobeProbe, MediaProbe};
use crate::error::{GenerationFailed, Stage};
use crate::extract::MetadataExtractor;
use crate::inject::ParameterInjector;
use crate::resolve::{resolve, OutputDescriptor, OutputKind};
use crate::submit::JobSubmitter;
use crate::template::TemplateStore;
use crate::upload::{AssetUploader, InputAsset};
use crate::wait::{waiter_for, CompletionWaiter};

/// One caller's generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub user_id: DbId,
    pub positive_prompt: String,
    /// Empty when the caller supplied none.
    pub negative_prompt: String,
    pub input_asset: Option<InputAsset>,
}

/// Everything known about a successful generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub job_id: String,
    pub input_asset_ref: Option<String>,
    pub output_filename: String,
    pub output_subfolder: Option<String>,
    pub output_kind: OutputKind,
    /// Download link on the engine's public base URL.
    pub output_url: String,
    pub metadata: VideoMetadata,
    #[serde(serialize_with = "serialize_source")]
    pub metadata_source: MetadataSource,
    pub created_at: Timestamp,
}

fn serialize_source<S: serde::Serializer>(source: &MetadataSource, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(source.as_str())
}

/// The generation pipeline.
///
/// Holds no per-request state; one instance serves any number of
/// concurrent [`run`](Self::run) calls.
pub struct GenerationPipeline {
    templates: TemplateStore,
    template_path: PathBuf,
    uploader: AssetUploader,
    injector: ParameterInjector,
    submitter: JobSubmitter,
    waiter: Arc<dyn CompletionWaiter>,
    extractor: MetadataExtractor,
    output_policy: OutputPolicy,
    public_url: String,
}

impl GenerationPipeline {
    /// Build a pipeline talking to the ComfyUI instance in `config`.
    pub fn new(config: &PipelineConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.engine_request_timeout)
            .build()?;
        let engine = Arc::new(ComfyUIApi::with_client(http, config.comfyui_url.clone()));
        let channel = Arc::new(ComfyUIClient::new(config.comfyui_ws_url.clone()));
        let probe = Arc::new(FfprobeProbe::new(config.ffprobe_path.clone()));
        Ok(Self::with_components(config, engine, channel, probe))
    }

    /// Build a pipeline from explicit engine, channel and probe
    /// implementations.
    pub fn with_components(
        config: &PipelineConfig,
        engine: Arc<dyn EngineApi>,
        channel: Arc<dyn EventChannel>,
        probe: Arc<dyn MediaProbe>,
    ) -> Self {
        Self {
            templates: TemplateStore::new(config.cache_template),
            template_path: config.template_path.clone(),
            uploader: AssetUploader::new(Arc::clone(&engine)),
            injector: ParameterInjector::new(config.slots.clone()),
            submitter: JobSubmitter::new(Arc::clone(&engine)),
            waiter: waiter_for(&config.completion, Arc::clone(&engine), channel),
            extractor: MetadataExtractor::new(
                engine,
                probe,
                config.metadata_source,
                config.artifact_temp_dir.clone(),
                config.probe_timeout,
            ),
            output_policy: config.output_policy,
            public_url: config.public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Run one request through every stage.
    ///
    /// Either returns a complete result or the first stage failure. A job
    /// that fails after submission is left to the engine; it is not
    /// cancelled there.
    pub async fn run(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, GenerationFailed> {
        let user_id = request.user_id;

        let template = self
            .templates
            .load(&self.template_path)
            .await
            .map_err(|e| self.failed(user_id, Stage::LoadTemplate, e))?;

        self.injector
            .check(&template)
            .map_err(|e| self.failed(user_id, Stage::Inject, e))?;

        let input_asset = match &request.input_asset {
            Some(asset) if !self.injector.accepts_image() => {
                tracing::warn!(
                    user_id,
                    filename = %asset.filename,
                    "Input image ignored, no image slot configured",
                );
                None
            }
            other => other.as_ref(),
        };
        let asset_ref = self
            .uploader
            .upload(input_asset)
            .await
            .map_err(|e| self.failed(user_id, Stage::Upload, e))?;

        let workflow = self
            .injector
            .inject(
                &template,
                &request.positive_prompt,
                &request.negative_prompt,
                asset_ref.as_ref().map(|r| r.as_str()),
            )
            .map_err(|e| self.failed(user_id, Stage::Inject, e))?;

        let job = self
            .submitter
            .submit(&workflow)
            .await
            .map_err(|e| self.failed(user_id, Stage::Submit, e))?;

        let payload = self
            .waiter
            .wait(&job, cancel)
            .await
            .map_err(|e| self.failed(user_id, Stage::Wait, e))?;

        let output = resolve(&payload, self.output_policy)
            .map_err(|e| self.failed(user_id, Stage::Resolve, e))?;

        let metadata = self
            .extractor
            .extract(&output)
            .await
            .map_err(|e| self.failed(user_id, Stage::Extract, e))?;

        tracing::info!(
            user_id,
            job_id = %job.job_id,
            filename = %output.filename,
            resolution = %metadata.resolution,
            "Generation completed",
        );

        Ok(GenerationResult {
            output_url: self.output_url(&output),
            job_id: job.job_id,
            input_asset_ref: asset_ref.map(|r| r.0),
            output_filename: output.filename,
            output_subfolder: output.subfolder,
            output_kind: output.kind,
            metadata,
            metadata_source: self.extractor.source(),
            created_at: chrono::Utc::now(),
        })
    }

    /// `/view` link for `output` on the public engine URL.
    pub fn output_url(&self, output: &OutputDescriptor) -> String {
        let base = format!("{}/view", self.public_url);
        let params = [
            ("filename", output.filename.as_str()),
            ("subfolder", output.subfolder.as_deref().unwrap_or_default()),
            ("type", output.folder_type.as_str()),
        ];
        match reqwest::Url::parse_with_params(&base, params) {
            Ok(url) => url.to_string(),
            Err(_) => format!(
                "{base}?filename={}&subfolder={}&type={}",
                params[0].1, params[1].1, params[2].1
            ),
        }
    }

    fn failed(
        &self,
        user_id: DbId,
        stage: Stage,
        source: impl Into<crate::error::StageError>,
    ) -> GenerationFailed {
        let err = GenerationFailed::new(stage, source);
        tracing::error!(
            user_id,
            stage = %stage,
            kind = err.kind().as_str(),
            error = %err.source,
            "Generation failed",
        );
        err
    }
}
