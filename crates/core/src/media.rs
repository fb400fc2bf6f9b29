//! Technical video metadata derived from probe output.
//!
//! Every derived field that cannot be recovered is reported as `None`
//! rather than zero: a false zero duration or frame rate is worse than
//! an explicit "unknown".

use serde::{Deserialize, Serialize};

use crate::ffmpeg::FfprobeOutput;

/// Technical properties of a produced artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    /// Frames per second; `None` when the source rate is unknown.
    pub frame_rate: Option<f64>,
    pub duration_secs: Option<f64>,
    pub frame_count: Option<u64>,
    /// `"{width}x{height}"`.
    pub resolution: String,
    /// Not every extraction path can recover the codec.
    pub codec: Option<String>,
}

impl VideoMetadata {
    /// Assemble metadata from individually recovered fields.
    ///
    /// When `duration_secs` is absent it is derived as
    /// `frame_count / frame_rate` if both are positive.
    pub fn from_parts(
        width: u32,
        height: u32,
        frame_rate: Option<f64>,
        frame_count: Option<u64>,
        duration_secs: Option<f64>,
        codec: Option<String>,
    ) -> Self {
        let frame_rate = frame_rate.filter(|r| r.is_finite() && *r > 0.0);
        let duration_secs = duration_secs
            .filter(|d| d.is_finite() && *d > 0.0)
            .or_else(|| derive_duration(frame_count, frame_rate));

        Self {
            width,
            height,
            frame_rate,
            duration_secs,
            frame_count,
            resolution: format!("{width}x{height}"),
            codec: codec.filter(|c| !c.is_empty()),
        }
    }

    /// Derive metadata from ffprobe output.
    ///
    /// Returns `None` when the output has no video stream or the stream
    /// does not report its dimensions.
    pub fn from_probe(probe: &FfprobeOutput) -> Option<Self> {
        let stream = probe.first_video_stream()?;
        let width = stream.width?;
        let height = stream.height?;

        // avg_frame_rate is the effective rate; r_frame_rate is the base
        // rate and can be a large timebase for variable-rate streams.
        let frame_rate = stream
            .avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate));

        let frame_count = stream
            .nb_frames
            .as_deref()
            .and_then(|n| n.trim().parse::<u64>().ok())
            .filter(|n| *n > 0);

        let duration = parse_seconds(probe.format.duration.as_deref())
            .or_else(|| parse_seconds(stream.duration.as_deref()));

        Some(Self::from_parts(
            width,
            height,
            frame_rate,
            frame_count,
            duration,
            stream.codec_name.clone(),
        ))
    }
}

/// Parse a frame rate given as a rational (`"30000/1001"`) or plain
/// decimal (`"25"`) string.
///
/// A zero denominator, a non-positive result, or an unparseable value
/// yields `None`.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// `frame_count / frame_rate` when both are known and positive.
pub fn derive_duration(frame_count: Option<u64>, frame_rate: Option<f64>) -> Option<f64> {
    match (frame_count, frame_rate) {
        (Some(frames), Some(rate)) if frames > 0 && rate > 0.0 => Some(frames as f64 / rate),
        _ => None,
    }
}

fn parse_seconds(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}
