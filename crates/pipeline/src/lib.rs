//! Generation orchestration pipeline.
//!
//! Turns one [`GenerationRequest`] into one [`GenerationResult`] by
//! driving the external engine through a fixed sequence of stages:
//!
//! 1. load the workflow template ([`template`])
//! 2. upload the optional input image ([`upload`])
//! 3. write the caller's prompts into the template ([`inject`])
//! 4. queue the workflow ([`submit`])
//! 5. wait for the job to finish ([`wait`])
//! 6. pick the produced artifact ([`resolve`])
//! 7. derive its technical metadata ([`extract`])
//!
//! [`orchestrator::GenerationPipeline`] composes the stages and reports
//! any failure as a single stage-tagged [`error::GenerationFailed`].

pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod inject;
pub mod orchestrator;
pub mod resolve;
pub mod submit;
pub mod template;
pub mod upload;
pub mod wait;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::PipelineConfig;
pub use error::{ErrorKind, GenerationFailed, Stage};
pub use orchestrator::{GenerationPipeline, GenerationRequest, GenerationResult};
