//! Audio engine seam.
//!
//! An engine owns whatever drives render quanta (a device stream, a paced thread) and pulls
//! audio from the [`OutputNode`] it was attached to. Engines are created and used on the
//! controller's worker thread, so they only need `Send` when built outside it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

use crate::config::OutputFormat;
use crate::node::OutputNode;

/// Drives the render routine of one attached node.
pub trait AudioEngine {
    /// Connect the node the engine renders from. Called once, before `start`.
    fn attach(&mut self, node: Arc<OutputNode>);

    fn is_running(&self) -> bool;

    /// Start rendering. Must be a no-op when already running.
    fn start(&mut self) -> Result<()>;
}

impl<E: AudioEngine + ?Sized> AudioEngine for Box<E> {
    fn attach(&mut self, node: Arc<OutputNode>) {
        (**self).attach(node)
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }

    fn start(&mut self) -> Result<()> {
        (**self).start()
    }
}

/// Renders on a background thread at real-time pace and discards the audio.
///
/// Useful on machines without an output device and for exercising the full pipeline in
/// tests. The render thread stops when the engine is dropped.
pub struct NullEngine {
    format: OutputFormat,
    quantum_frames: usize,
    node: Option<Arc<OutputNode>>,
    running: Option<NullRender>,
}

struct NullRender {
    shutdown: Arc<AtomicBool>,
    join: thread::JoinHandle<()>,
}

impl NullEngine {
    /// `quantum_frames` is the size of one render call, in output frames.
    pub fn new(format: OutputFormat, quantum_frames: usize) -> Self {
        Self {
            format,
            quantum_frames: quantum_frames.max(1),
            node: None,
            running: None,
        }
    }
}

impl AudioEngine for NullEngine {
    fn attach(&mut self, node: Arc<OutputNode>) {
        self.node = Some(node);
    }

    fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }
        let node = self
            .node
            .clone()
            .ok_or_else(|| anyhow!("no output node attached"))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let frames = self.quantum_frames;
        let period =
            Duration::from_secs_f64(frames as f64 / f64::from(self.format.sample_rate.max(1)));

        let join = thread::Builder::new()
            .name("null-render".to_string())
            .spawn(move || {
                let mut data = vec![0.0f32; frames];
                let mut scratch = Vec::with_capacity(frames);
                let mut next = Instant::now();
                while !shutdown_thread.load(Ordering::Relaxed) {
                    node.render(&mut data, 1, &mut scratch);
                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
            })?;

        tracing::info!(
            rate_hz = self.format.sample_rate,
            quantum_frames = frames,
            "null output engine started"
        );
        self.running = Some(NullRender { shutdown, join });
        Ok(())
    }
}

impl Drop for NullEngine {
    fn drop(&mut self) {
        if let Some(render) = self.running.take() {
            render.shutdown.store(true, Ordering::Relaxed);
            let _ = render.join.join();
        }
    }
}
