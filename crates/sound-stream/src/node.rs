//! Output node: the queue plus the state the render routine reads every quantum.
//!
//! [`OutputNode::render`] runs on the render context (the CPAL callback or the null engine's
//! render thread). It never blocks on anything but the queue mutex and never waits on a
//! condition variable. Stopped nodes render silence and leave the queue alone.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crossbeam_channel::Sender;

use crate::convert::ConvertedBuffer;
use crate::pan::pan_gains;
use crate::queue::BufferQueue;
use crate::status::PlayerEvent;

/// Single output node fed by the scheduler and drained by the engine.
pub struct OutputNode {
    queue: BufferQueue,
    playing: AtomicBool,
    pan_bits: AtomicU32,
    rendered_frames: AtomicU64,
    underrun_frames: AtomicU64,
    underrun_events: AtomicU64,
    events: Option<Sender<PlayerEvent>>,
}

impl OutputNode {
    /// Create a node. Buffer completions are reported on `events` when given.
    pub fn new(events: Option<Sender<PlayerEvent>>) -> Arc<Self> {
        Arc::new(Self {
            queue: BufferQueue::new(),
            playing: AtomicBool::new(false),
            pan_bits: AtomicU32::new(0.0f32.to_bits()),
            rendered_frames: AtomicU64::new(0),
            underrun_frames: AtomicU64::new(0),
            underrun_events: AtomicU64::new(0),
            events,
        })
    }

    pub fn queue(&self) -> &BufferQueue {
        &self.queue
    }

    pub fn enqueue(&self, buffer: ConvertedBuffer) -> bool {
        self.queue.push(buffer)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn play(&self) {
        self.playing.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.playing.store(false, Ordering::Release);
    }

    pub fn pan(&self) -> f32 {
        f32::from_bits(self.pan_bits.load(Ordering::Relaxed))
    }

    pub fn set_pan(&self, pan: f32) {
        self.pan_bits.store(pan.clamp(-1.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Frames of queued audio rendered so far.
    pub fn rendered_frames(&self) -> u64 {
        self.rendered_frames.load(Ordering::Relaxed)
    }

    /// Frames of silence rendered because the queue ran dry while playing.
    pub fn underrun_frames(&self) -> u64 {
        self.underrun_frames.load(Ordering::Relaxed)
    }

    pub fn underrun_events(&self) -> u64 {
        self.underrun_events.load(Ordering::Relaxed)
    }

    /// Forward an asynchronous device error to the caller's event channel.
    pub fn report_stream_error(&self, message: String) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(PlayerEvent::StreamError(message));
        }
    }

    /// Render one quantum of interleaved `f32` audio into `data`.
    ///
    /// `scratch` holds the mono source samples and is grown to the quantum's frame count.
    /// Mono devices get the source unchanged; stereo gets the pan law; extra channels are
    /// silent.
    pub fn render(&self, data: &mut [f32], channels: usize, scratch: &mut Vec<f32>) {
        let channels = channels.max(1);
        let frames = data.len() / channels;
        if !self.is_playing() {
            data.fill(0.0);
            return;
        }

        if scratch.len() < frames {
            scratch.resize(frames, 0.0);
        }
        let mono = &mut scratch[..frames];
        let filled = self.queue.fill(mono, |sequence| {
            if let Some(tx) = &self.events {
                let _ = tx.try_send(PlayerEvent::BufferConsumed { sequence });
            }
        });
        mono[filled..].fill(0.0);

        self.rendered_frames
            .fetch_add(filled as u64, Ordering::Relaxed);
        if filled < frames {
            self.underrun_events.fetch_add(1, Ordering::Relaxed);
            self.underrun_frames
                .fetch_add((frames - filled) as u64, Ordering::Relaxed);
        }

        if channels == 1 {
            data[..frames].copy_from_slice(mono);
            return;
        }

        let (gl, gr) = pan_gains(self.pan());
        for (frame, s) in data.chunks_exact_mut(channels).zip(mono.iter()) {
            frame[0] = s * gl;
            frame[1] = s * gr;
            frame[2..].fill(0.0);
        }
    }
}
