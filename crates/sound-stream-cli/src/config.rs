//! Configuration loading and resolution.
//!
//! Values come from an optional TOML file and are overridden by explicit CLI flags.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use sound_stream::config::{EngineConfig, OutputFormat, StopPolicy};

use crate::cli::Args;

/// Player configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// Output device substring match.
    pub device: Option<String>,
    /// Engine output sample rate in Hz.
    pub output_sample_rate: Option<u32>,
    /// Queue handling on stop.
    pub stop_policy: Option<StopPolicy>,
    /// Render to the null sink instead of a device.
    pub null_output: Option<bool>,
}

impl FileConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        toml::from_str::<FileConfig>(&raw).with_context(|| format!("parse config {:?}", path))
    }
}

/// Effective runtime settings after merging file and flags.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub engine: EngineConfig,
    pub null_output: bool,
}

pub fn resolve(args: &Args, file: Option<&FileConfig>) -> ResolvedConfig {
    let file_default = FileConfig::default();
    let file = file.unwrap_or(&file_default);

    let device = args
        .device
        .clone()
        .or_else(|| file.device.clone())
        .and_then(normalize_device_name);
    let output_rate = args
        .output_rate
        .or(file.output_sample_rate)
        .unwrap_or(sound_stream::config::DEFAULT_OUTPUT_SAMPLE_RATE);
    let stop_policy = args.stop_policy.or(file.stop_policy).unwrap_or_default();
    let null_output = args.null_output || file.null_output.unwrap_or(false);

    ResolvedConfig {
        engine: EngineConfig {
            output: OutputFormat::new(output_rate),
            stop_policy,
            device,
        },
        null_output,
    }
}

fn normalize_device_name(name: String) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
