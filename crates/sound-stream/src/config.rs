//! Format and engine configuration shared by the convert/schedule/render stages.

use serde::Deserialize;

/// Sample rate the caller's chunks are assumed to have until `initializePlayer` says otherwise.
pub const DEFAULT_INPUT_SAMPLE_RATE: f64 = 16_000.0;

/// Lowest input sample rate `initializePlayer` accepts, in Hz.
pub const MIN_INPUT_SAMPLE_RATE: f64 = 1.0;

/// Highest input sample rate `initializePlayer` accepts, in Hz.
pub const MAX_INPUT_SAMPLE_RATE: f64 = 768_000.0;

/// Sample rate of the engine's internal float stream.
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 32_000;

/// The engine's native buffer format: interleaved `f32`, mono, fixed rate.
///
/// Set once when the engine is built and never mutated afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputFormat {
    /// Output stream sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count of converted buffers. Always 1.
    pub channels: u16,
}

impl OutputFormat {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: 1,
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_SAMPLE_RATE)
    }
}

/// Caller-declared input format (16-bit signed little-endian mono).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerConfig {
    /// Input sample rate in Hz; always within
    /// [`MIN_INPUT_SAMPLE_RATE`, `MAX_INPUT_SAMPLE_RATE`].
    pub sample_rate_hz: f64,
}

impl PlayerConfig {
    /// Bytes per input frame (one `i16` sample).
    pub const BYTES_PER_FRAME: usize = 2;
    /// Input channel count.
    pub const CHANNELS: u16 = 1;

    /// Build a config, rejecting rates outside the supported range (NaN included).
    pub fn new(sample_rate_hz: f64) -> Option<Self> {
        if (MIN_INPUT_SAMPLE_RATE..=MAX_INPUT_SAMPLE_RATE).contains(&sample_rate_hz) {
            Some(Self { sample_rate_hz })
        } else {
            None
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_INPUT_SAMPLE_RATE,
        }
    }
}

/// What a stop does to audio that was queued but not yet rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Drop the partially-played buffer and everything queued behind it.
    #[default]
    Discard,
    /// Keep the queue and the render position; the next start resumes mid-buffer.
    Retain,
}

impl std::str::FromStr for StopPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(StopPolicy::Discard),
            "retain" => Ok(StopPolicy::Retain),
            other => Err(format!("unknown stop policy: {other} (expected discard|retain)")),
        }
    }
}

/// Engine-level tuning fixed at construction.
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    /// Native output format of converted buffers.
    pub output: OutputFormat,
    /// Queue handling on stop.
    pub stop_policy: StopPolicy,
    /// Output device substring match; `None` uses the host default.
    pub device: Option<String>,
}
