//! CPAL output engine.
//!
//! Builds the CPAL output stream and provides the real-time audio callback.
//! The callback:
//! - renders one quantum of `f32` audio from the attached [`OutputNode`]
//! - adapts the engine rate to the device rate when the device cannot open at it
//! - converts `f32` samples to the device sample format

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::config::OutputFormat;
use crate::device;
use crate::engine::AudioEngine;
use crate::node::OutputNode;

/// Preferred device callback size in frames (~32 ms at 32 kHz).
const TARGET_BUFFER_FRAMES: u32 = 1024;

/// Engine backed by a CPAL output stream on the default host.
///
/// The device is opened lazily on the first `start`, so constructing the engine never touches
/// hardware and device errors surface from `start`.
pub struct CpalEngine {
    format: OutputFormat,
    device: Option<String>,
    node: Option<Arc<OutputNode>>,
    stream: Option<cpal::Stream>,
}

impl CpalEngine {
    /// `device` selects an output by substring match; `None` uses the host default.
    pub fn new(format: OutputFormat, device: Option<String>) -> Self {
        Self {
            format,
            device,
            node: None,
            stream: None,
        }
    }

    fn open_stream(&self, node: Arc<OutputNode>) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, self.device.as_deref())?;
        let device_name = device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let supported = device::pick_output_config(&device, self.format.sample_rate)?;
        let mut stream_config = supported.config();
        if let Some(size) = device::pick_buffer_size(&supported, TARGET_BUFFER_FRAMES) {
            stream_config.buffer_size = size;
        }

        if stream_config.sample_rate != self.format.sample_rate {
            tracing::warn!(
                engine_rate_hz = self.format.sample_rate,
                device_rate_hz = stream_config.sample_rate,
                "device cannot open at engine rate; adapting in callback"
            );
        }
        tracing::info!(
            device = %device_name,
            rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            sample_format = ?supported.sample_format(),
            "opening output stream"
        );

        build_output_stream(
            &device,
            &stream_config,
            supported.sample_format(),
            self.format,
            node,
        )
    }
}

impl AudioEngine for CpalEngine {
    fn attach(&mut self, node: Arc<OutputNode>) {
        self.node = Some(node);
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let node = self
            .node
            .clone()
            .ok_or_else(|| anyhow!("no output node attached"))?;
        let stream = self.open_stream(node)?;
        stream.play().context("start output stream")?;
        self.stream = Some(stream);
        Ok(())
    }
}

/// Build a CPAL output stream that renders from `node`.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    format: OutputFormat,
    node: Arc<OutputNode>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, format, node),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, format, node),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, format, node),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, format, node),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: OutputFormat,
    node: Arc<OutputNode>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let adapter = (config.sample_rate != format.sample_rate)
        .then(|| RateAdapter::new(format.sample_rate, config.sample_rate, channels));

    let mut state = CallbackState {
        out: Vec::new(),
        scratch: Vec::new(),
        adapter,
    };

    let node_err = node.clone();
    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("stream error: {err}");
        node_err.report_stream_error(err.to_string());
    };

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                let CallbackState {
                    out,
                    scratch,
                    adapter,
                } = &mut state;
                out.resize(data.len(), 0.0);
                match adapter {
                    Some(a) => a.process(&node, out, scratch),
                    None => node.render(out, channels, scratch),
                }
                for (dst, src) in data.iter_mut().zip(out.iter()) {
                    *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
                }
            },
            err_fn,
            None,
        )
        .context("build output stream")?;

    Ok(stream)
}

/// Per-stream buffers owned by the callback closure.
struct CallbackState {
    out: Vec<f32>,
    scratch: Vec<f32>,
    adapter: Option<RateAdapter>,
}

/// Streaming linear rate adapter between the engine rate and the device rate.
///
/// Keeps the not-yet-consumed source frames between callbacks so interpolation is continuous
/// across quantum boundaries. `pos` is the fractional read position into `src`, in `[0, 1)`
/// after every call.
struct RateAdapter {
    channels: usize,
    step: f64,
    pos: f64,
    src: Vec<f32>,
}

impl RateAdapter {
    fn new(engine_rate: u32, device_rate: u32, channels: usize) -> Self {
        Self {
            channels: channels.max(1),
            step: f64::from(engine_rate) / f64::from(device_rate.max(1)),
            pos: 0.0,
            src: Vec::new(),
        }
    }

    fn process(&mut self, node: &OutputNode, out: &mut [f32], scratch: &mut Vec<f32>) {
        let ch = self.channels;
        let frames = out.len() / ch;
        if frames == 0 {
            return;
        }

        let last_pos = self.pos + (frames - 1) as f64 * self.step;
        let end_pos = self.pos + frames as f64 * self.step;
        let need = (last_pos.floor() as usize + 2).max(end_pos.floor() as usize);

        let have = self.src.len() / ch;
        if have < need {
            let start = self.src.len();
            self.src.resize(need * ch, 0.0);
            node.render(&mut self.src[start..], ch, scratch);
        }

        for k in 0..frames {
            let p = self.pos + k as f64 * self.step;
            let i = p.floor() as usize;
            let t = (p - i as f64) as f32;
            for c in 0..ch {
                let a = self.src[i * ch + c];
                let b = self.src[(i + 1) * ch + c];
                out[k * ch + c] = a + (b - a) * t;
            }
        }

        let consumed = end_pos.floor() as usize;
        self.src.drain(..consumed * ch);
        self.pos = end_pos - consumed as f64;
    }
}
