//! In-process fakes of the engine, its event channel and the prober.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use serde_json::{json, Value};
use vidgen_comfyui::api::{SubmitResponse, UploadResponse};
use vidgen_comfyui::messages::{parse_message, ComfyUIMessage};
use vidgen_core::ffmpeg::{FfmpegError, FfprobeFormat, FfprobeOutput, FfprobeStream};

use crate::engine::{EngineApi, EngineError, EventChannel, EventStream, MediaProbe};
use crate::submit::JobHandle;
use crate::template::WorkflowTemplate;

const SHIPPED_TEMPLATE: &str = include_str!("../../../workflows/video_generation.json");

/// The workflow template shipped with the service.
pub fn sample_template() -> WorkflowTemplate {
    WorkflowTemplate::parse(SHIPPED_TEMPLATE).unwrap()
}

pub fn sample_template_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SHIPPED_TEMPLATE.as_bytes()).unwrap();
    file
}

pub fn job(job_id: &str) -> JobHandle {
    JobHandle {
        job_id: job_id.into(),
        client_id: format!("client-{job_id}"),
    }
}

pub fn event(raw: Value) -> ComfyUIMessage {
    parse_message(&raw.to_string()).unwrap()
}

#[derive(Default)]
struct EngineState {
    uploads: Vec<(String, String)>,
    upload_error: Option<EngineError>,
    submissions: Vec<(Value, String)>,
    submit_error: Option<EngineError>,
    history_queue: VecDeque<Result<Value, EngineError>>,
    history_fallback: Option<Result<Value, EngineError>>,
    history_calls: usize,
    completed_outputs: Option<Value>,
    job_failure: Option<String>,
    downloads: Vec<(String, String, String)>,
    download_error: Option<EngineError>,
    download_body: Option<Vec<u8>>,
}

/// Scriptable [`EngineApi`].
///
/// History answers come from, in order: the queue filled by
/// `push_history`, the scripted job failure, the scripted completion
/// outputs (for whichever job is asked about), the fallback, and
/// finally an empty object.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn submissions(&self) -> Vec<(Value, String)> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn downloads(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().downloads.clone()
    }

    pub fn history_calls(&self) -> usize {
        self.state.lock().unwrap().history_calls
    }

    pub fn fail_uploads(&self, err: EngineError) {
        self.state.lock().unwrap().upload_error = Some(err);
    }

    pub fn fail_submits(&self, err: EngineError) {
        self.state.lock().unwrap().submit_error = Some(err);
    }

    pub fn fail_downloads(&self, err: EngineError) {
        self.state.lock().unwrap().download_error = Some(err);
    }

    pub fn set_download_body(&self, body: Vec<u8>) {
        self.state.lock().unwrap().download_body = Some(body);
    }

    pub fn push_history(&self, answer: Result<Value, EngineError>) {
        self.state.lock().unwrap().history_queue.push_back(answer);
    }

    pub fn set_history_fallback(&self, answer: Result<Value, EngineError>) {
        self.state.lock().unwrap().history_fallback = Some(answer);
    }

    /// Every job asked about reports these outputs.
    pub fn complete_submissions_with(&self, outputs: Value) {
        self.state.lock().unwrap().completed_outputs = Some(outputs);
    }

    /// Every job asked about reports an execution error.
    pub fn fail_jobs_with(&self, message: &str) {
        self.state.lock().unwrap().job_failure = Some(message.to_string());
    }
}

#[async_trait]
impl EngineApi for FakeEngine {
    async fn upload_image(
        &self,
        _bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadResponse, EngineError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.upload_error.clone() {
            return Err(err);
        }
        state
            .uploads
            .push((filename.to_string(), content_type.to_string()));
        Ok(UploadResponse {
            name: filename.to_string(),
            subfolder: String::new(),
            folder_type: "input".into(),
        })
    }

    async fn submit(&self, workflow: &Value, client_id: &str) -> Result<SubmitResponse, EngineError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.submit_error.clone() {
            return Err(err);
        }
        state
            .submissions
            .push((workflow.clone(), client_id.to_string()));
        let number = state.submissions.len() as i64;
        Ok(SubmitResponse {
            prompt_id: format!("job-{number}"),
            number,
            node_errors: json!({}),
        })
    }

    async fn history(&self, job_id: &str) -> Result<Value, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.history_calls += 1;
        if let Some(answer) = state.history_queue.pop_front() {
            return answer;
        }
        if let Some(message) = &state.job_failure {
            return Ok(json!({
                job_id: {
                    "outputs": {},
                    "status": {
                        "status_str": "error",
                        "completed": false,
                        "messages": [["execution_error", {"prompt_id": job_id, "exception_message": message}]]
                    }
                }
            }));
        }
        if let Some(outputs) = &state.completed_outputs {
            return Ok(json!({
                job_id: {
                    "outputs": outputs,
                    "status": {"status_str": "success", "completed": true, "messages": []}
                }
            }));
        }
        match &state.history_fallback {
            Some(answer) => answer.clone(),
            None => Ok(json!({})),
        }
    }

    async fn download(
        &self,
        filename: &str,
        subfolder: &str,
        folder_type: &str,
    ) -> Result<Vec<u8>, EngineError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.download_error.clone() {
            return Err(err);
        }
        state.downloads.push((
            filename.to_string(),
            subfolder.to_string(),
            folder_type.to_string(),
        ));
        Ok(state
            .download_body
            .clone()
            .unwrap_or_else(|| b"\x00\x00\x00\x18ftypmp42".to_vec()))
    }
}

type EventItem = Result<ComfyUIMessage, EngineError>;

/// [`EventChannel`] fed by the test through an unbounded sender.
///
/// The sender reports `is_closed()` once the waiter drops the stream.
pub struct FakeChannel {
    rx: Mutex<Option<UnboundedReceiver<EventItem>>>,
    subscribed_as: Mutex<Option<String>>,
    fail: AtomicBool,
}

impl FakeChannel {
    pub fn new() -> (Arc<Self>, UnboundedSender<EventItem>) {
        let (tx, rx) = unbounded();
        let channel = Arc::new(Self {
            rx: Mutex::new(Some(rx)),
            subscribed_as: Mutex::new(None),
            fail: AtomicBool::new(false),
        });
        (channel, tx)
    }

    pub fn fail_subscribe(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn subscribed_as(&self) -> Option<String> {
        self.subscribed_as.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventChannel for FakeChannel {
    async fn subscribe(&self, client_id: &str) -> Result<EventStream, EngineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Transport("connection refused".into()));
        }
        *self.subscribed_as.lock().unwrap() = Some(client_id.to_string());
        match self.rx.lock().unwrap().take() {
            Some(rx) => Ok(rx.boxed()),
            None => Err(EngineError::Transport("already subscribed".into())),
        }
    }
}

/// [`MediaProbe`] returning a canned result and recording what it saw.
pub struct FakeProbe {
    output: Option<FfprobeOutput>,
    stall: bool,
    seen: Mutex<Option<(PathBuf, bool)>>,
}

impl FakeProbe {
    pub fn video(codec: &str, width: u32, height: u32, rate: &str, frames: Option<&str>) -> Self {
        let output = FfprobeOutput {
            streams: vec![FfprobeStream {
                index: 0,
                codec_name: Some(codec.into()),
                codec_type: Some("video".into()),
                width: Some(width),
                height: Some(height),
                r_frame_rate: Some(rate.into()),
                nb_frames: frames.map(str::to_string),
                ..Default::default()
            }],
            format: FfprobeFormat::default(),
        };
        Self {
            output: Some(output),
            stall: false,
            seen: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            output: None,
            stall: false,
            seen: Mutex::new(None),
        }
    }

    /// Never returns, like an ffprobe stuck on a truncated file.
    pub fn stalled() -> Self {
        Self {
            output: None,
            stall: true,
            seen: Mutex::new(None),
        }
    }

    pub fn seen_path(&self) -> Option<PathBuf> {
        self.seen.lock().unwrap().as_ref().map(|(p, _)| p.clone())
    }

    pub fn file_existed_during_probe(&self) -> bool {
        self.seen
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|(_, existed)| *existed)
    }
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> Result<FfprobeOutput, FfmpegError> {
        *self.seen.lock().unwrap() = Some((path.to_path_buf(), path.exists()));
        if self.stall {
            std::future::pending::<()>().await;
        }
        self.output.clone().ok_or_else(|| FfmpegError::ExecutionFailed {
            exit_code: Some(1),
            stderr: "Invalid data found when processing input".into(),
        })
    }
}
