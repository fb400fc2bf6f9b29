//! Domain primitives shared by every vidgen crate.
//!
//! - [`types`] -- database id and timestamp aliases.
//! - [`error`] -- the domain-level [`error::CoreError`].
//! - [`ffmpeg`] -- ffprobe invocation and its JSON output model.
//! - [`media`] -- technical video metadata derived from probe output.

pub mod error;
pub mod ffmpeg;
pub mod media;
pub mod types;
