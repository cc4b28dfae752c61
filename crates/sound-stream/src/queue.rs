//! Thread-safe FIFO of converted buffers.
//!
//! The command context pushes whole [`ConvertedBuffer`]s; the render context drains samples
//! across buffer boundaries without gaps. One mutex guards both the pending buffers and the
//! partially-rendered head so the two contexts never race on positions or counters.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::convert::ConvertedBuffer;

/// FIFO shared between the scheduler (producer) and the render callback (consumer).
#[derive(Default)]
pub struct BufferQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

#[derive(Default)]
struct QueueInner {
    pending: VecDeque<ConvertedBuffer>,
    /// Buffer currently being rendered and the next sample index in it.
    head: Option<(ConvertedBuffer, usize)>,
    queued_frames: usize,
}

impl BufferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a buffer behind everything already queued. Empty buffers are ignored.
    pub fn push(&self, buffer: ConvertedBuffer) -> bool {
        if buffer.samples.is_empty() {
            return false;
        }
        let mut g = self.lock();
        g.queued_frames += buffer.frames();
        g.pending.push_back(buffer);
        true
    }

    /// Fill `out` with the next queued samples in FIFO order.
    ///
    /// Returns the number of samples written; the remainder of `out` is left untouched.
    /// `on_complete` is called with the sequence number of every buffer that was fully
    /// rendered during this call, in order.
    pub fn fill(&self, out: &mut [f32], mut on_complete: impl FnMut(u64)) -> usize {
        let mut g = self.lock();
        let mut written = 0;

        while written < out.len() {
            if g.head.is_none() {
                match g.pending.pop_front() {
                    Some(next) => g.head = Some((next, 0)),
                    None => break,
                }
            }
            let Some((buf, pos)) = g.head.as_mut() else {
                break;
            };

            let take = (buf.samples.len() - *pos).min(out.len() - written);
            out[written..written + take].copy_from_slice(&buf.samples[*pos..*pos + take]);
            *pos += take;
            written += take;

            if *pos >= buf.samples.len() {
                let seq = buf.sequence;
                g.head = None;
                on_complete(seq);
            }
        }

        g.queued_frames -= written;
        let drained = g.queued_frames == 0;
        drop(g);
        if drained && written > 0 {
            self.cv.notify_all();
        }
        written
    }

    /// Drop the partially-rendered buffer and everything pending.
    ///
    /// Returns the number of buffers discarded.
    pub fn clear(&self) -> usize {
        let mut g = self.lock();
        let dropped = g.pending.len() + usize::from(g.head.is_some());
        g.pending.clear();
        g.head = None;
        g.queued_frames = 0;
        drop(g);
        self.cv.notify_all();
        dropped
    }

    /// Buffers not yet fully rendered (including a partially-rendered head).
    pub fn len_buffers(&self) -> usize {
        let g = self.lock();
        g.pending.len() + usize::from(g.head.is_some())
    }

    /// Frames not yet rendered (best-effort snapshot).
    pub fn len_frames(&self) -> usize {
        self.lock().queued_frames
    }

    pub fn is_empty(&self) -> bool {
        self.len_frames() == 0
    }

    /// Block until every queued frame has been rendered or dropped.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub fn wait_until_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.lock();
        while g.queued_frames > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (ng, _timeout) = self
                .cv
                .wait_timeout(g, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            g = ng;
        }
        true
    }
}
