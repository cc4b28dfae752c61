//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - choosing a stream config as close as possible to the engine's output rate

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device whose name contains `needle` (case-insensitive), or the
/// host default device when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose the output config for `target_rate`.
///
/// An exact rate match wins; otherwise the highest supported rate below the target, then the
/// lowest rate above it. Ties prefer `f32`, then wider integer formats.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query supported output configs")?
        .collect();

    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let candidate = Candidate {
            exact: rate == target_rate,
            below: rate <= target_rate,
            rate,
            format_rank: sample_format_rank(range.sample_format()),
            channels: range.channels(),
        };
        let replace = match &best {
            None => true,
            Some((current, _)) => candidate.is_better_than(current, target_rate),
        };
        if replace {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Prefer a fixed buffer size close to `target_frames` if the device advertises a range.
///
/// Returns `None` when the device only supports its default buffer size.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    target_frames: u32,
) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(target_frames.clamp(*min, *max)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print available output devices to stdout (CLI `--list-devices`).
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        let name = d.description()?;
        match d.default_output_config() {
            Ok(cfg) => println!(
                "#{i}: {name} ({} Hz, {} ch, {:?})",
                cfg.sample_rate(),
                cfg.channels(),
                cfg.sample_format()
            ),
            Err(_) => println!("#{i}: {name}"),
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    exact: bool,
    below: bool,
    rate: u32,
    format_rank: u8,
    channels: u16,
}

impl Candidate {
    fn is_better_than(&self, other: &Candidate, target_rate: u32) -> bool {
        if self.exact != other.exact {
            return self.exact;
        }
        if self.rate != other.rate {
            if self.below != other.below {
                return self.below;
            }
            // Both below: closer to target means higher. Both above: lower.
            return if self.below {
                self.rate > other.rate
            } else {
                self.rate.abs_diff(target_rate) < other.rate.abs_diff(target_rate)
            };
        }
        if self.format_rank != other.format_rank {
            return self.format_rank < other.format_rank;
        }
        channel_rank(self.channels) < channel_rank(other.channels)
    }
}

/// Stereo first (pan is audible), then mono, then anything else.
fn channel_rank(channels: u16) -> u8 {
    match channels {
        2 => 0,
        1 => 1,
        _ => 2,
    }
}

fn pick_rate_for_range(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
