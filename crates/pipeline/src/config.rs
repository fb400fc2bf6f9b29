//! Pipeline configuration.
//!
//! Built once at process start and shared by reference; nothing in the
//! pipeline reads the environment after construction.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vidgen_comfyui::client::ws_url_from_http;

/// Default engine HTTP base URL.
pub const DEFAULT_COMFYUI_URL: &str = "http://127.0.0.1:8188";
/// Default location of the workflow template.
pub const DEFAULT_TEMPLATE_PATH: &str = "workflows/video_generation.json";
/// Default interval between history polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Default overall completion deadline.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(900);
/// Default per-request timeout for engine HTTP calls.
pub const DEFAULT_ENGINE_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// Default deadline for one ffprobe run.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// How the pipeline detects that a submitted job has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionStrategy {
    /// Poll `GET /history/{id}` at a fixed interval.
    #[default]
    Polling,
    /// Subscribe to the engine's WebSocket event channel.
    Push,
}

impl FromStr for CompletionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polling" | "poll" => Ok(Self::Polling),
            "push" | "websocket" | "ws" => Ok(Self::Push),
            other => Err(format!("unknown completion strategy '{other}'")),
        }
    }
}

/// Which output kinds the resolver may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputPolicy {
    /// Video kinds first, still images as a fallback.
    #[default]
    PreferVideo,
    /// Only video kinds; a still-only payload counts as no output.
    VideoOnly,
}

impl FromStr for OutputPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefer_video" => Ok(Self::PreferVideo),
            "video_only" => Ok(Self::VideoOnly),
            other => Err(format!("unknown output policy '{other}'")),
        }
    }
}

/// Source of truth for artifact metadata.
///
/// Probing the downloaded file and trusting the engine's own echo can
/// disagree, so a deployment picks exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataSource {
    /// Download the artifact and run ffprobe on it.
    #[default]
    Probe,
    /// Read the fields the engine reports next to the output entry.
    Engine,
}

impl MetadataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Probe => "probe",
            Self::Engine => "engine",
        }
    }
}

impl FromStr for MetadataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "probe" | "ffprobe" => Ok(Self::Probe),
            "engine" => Ok(Self::Engine),
            other => Err(format!("unknown metadata source '{other}'")),
        }
    }
}

/// One writable input of one template node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRef {
    pub node_id: String,
    pub input: String,
}

impl SlotRef {
    pub fn new(node_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            input: input.into(),
        }
    }
}

/// Where the injector writes each caller parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSlots {
    pub positive: SlotRef,
    pub negative: SlotRef,
    /// `None` for templates without an image input.
    pub image: Option<SlotRef>,
}

impl Default for WorkflowSlots {
    fn default() -> Self {
        Self {
            positive: SlotRef::new("6", "text"),
            negative: SlotRef::new("7", "text"),
            image: Some(SlotRef::new("1206", "image")),
        }
    }
}

/// Completion waiting parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionConfig {
    pub strategy: CompletionStrategy,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            strategy: CompletionStrategy::Polling,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_COMPLETION_TIMEOUT,
        }
    }
}

/// Everything the pipeline needs to know about its deployment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Engine HTTP base URL used by the pipeline.
    pub comfyui_url: String,
    /// Engine WebSocket base URL.
    pub comfyui_ws_url: String,
    /// Engine base URL as reachable by API clients; used for output links.
    pub public_url: String,
    pub template_path: PathBuf,
    /// Keep parsed templates in memory across requests.
    pub cache_template: bool,
    pub slots: WorkflowSlots,
    pub completion: CompletionConfig,
    pub output_policy: OutputPolicy,
    pub metadata_source: MetadataSource,
    /// Per-request timeout for engine HTTP calls (uploads, polls, downloads).
    pub engine_request_timeout: Duration,
    /// Directory for downloaded artifacts; system temp dir when `None`.
    pub artifact_temp_dir: Option<PathBuf>,
    pub ffprobe_path: String,
    /// Deadline for probing one downloaded artifact.
    pub probe_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            comfyui_url: DEFAULT_COMFYUI_URL.into(),
            comfyui_ws_url: ws_url_from_http(DEFAULT_COMFYUI_URL),
            public_url: DEFAULT_COMFYUI_URL.into(),
            template_path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
            cache_template: true,
            slots: WorkflowSlots::default(),
            completion: CompletionConfig::default(),
            output_policy: OutputPolicy::default(),
            metadata_source: MetadataSource::default(),
            engine_request_timeout: DEFAULT_ENGINE_REQUEST_TIMEOUT,
            artifact_temp_dir: None,
            ffprobe_path: "ffprobe".into(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl PipelineConfig {
    /// Longest a single [`run`](crate::GenerationPipeline::run) can take
    /// before some stage reports its own timeout.
    ///
    /// Upload, submit and artifact download each get one engine request
    /// timeout; waiting gets the completion deadline; probing gets the
    /// probe deadline. Template loading and injection are local and
    /// left out.
    pub fn stage_budget(&self) -> Duration {
        self.engine_request_timeout * 3 + self.completion.timeout + self.probe_timeout
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                            |
    /// |---------------------------------|------------------------------------|
    /// | `COMFYUI_URL`                   | `http://127.0.0.1:8188`            |
    /// | `COMFYUI_WS_URL`                | derived from `COMFYUI_URL`         |
    /// | `COMFYUI_PUBLIC_URL`            | `COMFYUI_URL`                      |
    /// | `WORKFLOW_TEMPLATE_PATH`        | `workflows/video_generation.json`  |
    /// | `WORKFLOW_CACHE`                | `true`                             |
    /// | `WORKFLOW_POSITIVE_NODE`        | `6`                                |
    /// | `WORKFLOW_NEGATIVE_NODE`        | `7`                                |
    /// | `WORKFLOW_IMAGE_NODE`           | `1206` (empty disables)            |
    /// | `COMPLETION_STRATEGY`           | `polling`                          |
    /// | `COMPLETION_POLL_INTERVAL_SECS` | `2`                                |
    /// | `COMPLETION_TIMEOUT_SECS`       | `900`                              |
    /// | `OUTPUT_POLICY`                 | `prefer_video`                     |
    /// | `METADATA_SOURCE`               | `probe`                            |
    /// | `ENGINE_REQUEST_TIMEOUT_SECS`   | `120`                              |
    /// | `ARTIFACT_TEMP_DIR`             | system temp dir                    |
    /// | `FFPROBE_PATH`                  | `ffprobe`                          |
    /// | `PROBE_TIMEOUT_SECS`            | `60`                               |
    ///
    /// Panics on invalid values; a misconfigured pipeline must not boot.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from an arbitrary
    /// key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let comfyui_url = get("COMFYUI_URL")
            .unwrap_or_else(|| DEFAULT_COMFYUI_URL.into())
            .trim_end_matches('/')
            .to_string();
        let comfyui_ws_url = get("COMFYUI_WS_URL").unwrap_or_else(|| ws_url_from_http(&comfyui_url));
        let public_url = get("COMFYUI_PUBLIC_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| comfyui_url.clone());

        let template_path = PathBuf::from(
            get("WORKFLOW_TEMPLATE_PATH").unwrap_or_else(|| DEFAULT_TEMPLATE_PATH.into()),
        );
        let cache_template = parse_or(&get, "WORKFLOW_CACHE", true);

        let defaults = WorkflowSlots::default();
        let positive = get("WORKFLOW_POSITIVE_NODE")
            .map(|n| SlotRef::new(n.trim(), "text"))
            .unwrap_or(defaults.positive);
        let negative = get("WORKFLOW_NEGATIVE_NODE")
            .map(|n| SlotRef::new(n.trim(), "text"))
            .unwrap_or(defaults.negative);
        let image = match get("WORKFLOW_IMAGE_NODE") {
            Some(n) if n.trim().is_empty() => None,
            Some(n) => Some(SlotRef::new(n.trim(), "image")),
            None => defaults.image,
        };

        let completion = CompletionConfig {
            strategy: parse_or(&get, "COMPLETION_STRATEGY", CompletionStrategy::Polling),
            poll_interval: Duration::from_secs(parse_or(&get, "COMPLETION_POLL_INTERVAL_SECS", 2u64)),
            timeout: Duration::from_secs(parse_or(&get, "COMPLETION_TIMEOUT_SECS", 900u64)),
        };
        if completion.poll_interval.is_zero() {
            panic!("COMPLETION_POLL_INTERVAL_SECS must be greater than zero");
        }

        Self {
            comfyui_url,
            comfyui_ws_url,
            public_url,
            template_path,
            cache_template,
            slots: WorkflowSlots {
                positive,
                negative,
                image,
            },
            completion,
            output_policy: parse_or(&get, "OUTPUT_POLICY", OutputPolicy::PreferVideo),
            metadata_source: parse_or(&get, "METADATA_SOURCE", MetadataSource::Probe),
            engine_request_timeout: Duration::from_secs(parse_or(
                &get,
                "ENGINE_REQUEST_TIMEOUT_SECS",
                DEFAULT_ENGINE_REQUEST_TIMEOUT.as_secs(),
            )),
            artifact_temp_dir: get("ARTIFACT_TEMP_DIR")
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from),
            ffprobe_path: get("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".into()),
            probe_timeout: Duration::from_secs(parse_or(&get, "PROBE_TIMEOUT_SECS", 60u64)),
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} has an invalid value '{raw}': {e}")),
        None => default,
    }
}
