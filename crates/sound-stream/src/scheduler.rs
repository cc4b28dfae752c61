//! Playback scheduler: owns the engine and its single output node.

use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::config::StopPolicy;
use crate::convert::ConvertedBuffer;
use crate::engine::AudioEngine;
use crate::error::PlayerError;
use crate::node::OutputNode;
use crate::status::PlayerEvent;

pub struct PlaybackScheduler<E: AudioEngine> {
    engine: E,
    node: Arc<OutputNode>,
    stop_policy: StopPolicy,
    next_sequence: u64,
}

impl<E: AudioEngine> PlaybackScheduler<E> {
    /// Attach a fresh node to `engine`. Buffer completions go to `events`.
    pub fn new(mut engine: E, stop_policy: StopPolicy, events: Option<Sender<PlayerEvent>>) -> Self {
        let node = OutputNode::new(events);
        engine.attach(node.clone());
        Self {
            engine,
            node,
            stop_policy,
            next_sequence: 0,
        }
    }

    pub fn node(&self) -> &Arc<OutputNode> {
        &self.node
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Queue converted samples behind everything already scheduled.
    ///
    /// Returns the sequence number assigned to the buffer, or `None` for an empty buffer
    /// (nothing is queued and no sequence number is consumed).
    pub fn enqueue(&mut self, samples: Vec<f32>) -> Option<u64> {
        if samples.is_empty() {
            return None;
        }
        let sequence = self.next_sequence;
        self.node.enqueue(ConvertedBuffer::new(sequence, samples));
        self.next_sequence += 1;
        Some(sequence)
    }

    /// Make sure the engine is running and the node is playing. Idempotent.
    pub fn start(&mut self) -> Result<(), PlayerError> {
        if !self.engine.is_running() {
            self.engine
                .start()
                .map_err(|e| PlayerError::PlaybackStart(format!("{e:#}")))?;
        }
        if !self.node.is_playing() {
            self.node.play();
        }
        Ok(())
    }

    /// Halt the node immediately, then apply the stop policy. Returns buffers discarded.
    pub fn stop(&mut self) -> usize {
        if self.node.is_playing() {
            self.node.stop();
        }
        match self.stop_policy {
            StopPolicy::Discard => self.node.queue().clear(),
            StopPolicy::Retain => 0,
        }
    }

    pub fn apply_pan(&self, pan: f32) {
        self.node.set_pan(pan);
    }

    pub fn is_playing(&self) -> bool {
        self.node.is_playing()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::{Result, anyhow};

    /// Engine whose render quanta are driven by the test itself.
    #[derive(Default)]
    pub(crate) struct ManualEngine {
        pub(crate) node: Option<Arc<OutputNode>>,
        pub(crate) running: bool,
        pub(crate) fail_start: bool,
        pub(crate) starts: usize,
    }

    impl ManualEngine {
        pub(crate) fn failing() -> Self {
            Self {
                fail_start: true,
                ..Self::default()
            }
        }
    }

    impl AudioEngine for ManualEngine {
        fn attach(&mut self, node: Arc<OutputNode>) {
            self.node = Some(node);
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn start(&mut self) -> Result<()> {
            self.starts += 1;
            if self.fail_start {
                return Err(anyhow!("device unavailable"));
            }
            self.running = true;
            Ok(())
        }
    }

    pub(crate) fn render(node: &OutputNode, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames];
        node.render(&mut out, 1, &mut Vec::new());
        out
    }

    fn scheduler(policy: StopPolicy) -> PlaybackScheduler<ManualEngine> {
        PlaybackScheduler::new(ManualEngine::default(), policy, None)
    }

    #[test]
    fn new_attaches_node_to_engine() {
        let s = scheduler(StopPolicy::Discard);
        let attached = s.engine().node.as_ref().unwrap();
        assert!(Arc::ptr_eq(attached, s.node()));
    }

    #[test]
    fn enqueue_assigns_increasing_sequences() {
        let mut s = scheduler(StopPolicy::Discard);
        assert_eq!(s.enqueue(vec![0.1]), Some(0));
        assert_eq!(s.enqueue(Vec::new()), None);
        assert_eq!(s.enqueue(vec![0.2]), Some(1));
    }

    #[test]
    fn start_is_idempotent() {
        let mut s = scheduler(StopPolicy::Discard);
        s.start().unwrap();
        s.start().unwrap();
        assert_eq!(s.engine().starts, 1);
        assert!(s.is_playing());
    }

    #[test]
    fn start_failure_is_reported_and_node_stays_stopped() {
        let mut s = PlaybackScheduler::new(ManualEngine::failing(), StopPolicy::Discard, None);
        let err = s.start().unwrap_err();
        assert_eq!(err.code(), "PlaybackStartError");
        assert!(err.message().contains("device unavailable"));
        assert!(!s.is_playing());
    }

    #[test]
    fn chunks_render_in_enqueue_order() {
        let mut s = scheduler(StopPolicy::Discard);
        s.enqueue(vec![0.1, 0.2, 0.3]);
        s.enqueue(vec![0.4, 0.5]);
        s.start().unwrap();
        assert_eq!(render(s.node(), 2), vec![0.1, 0.2]);
        assert_eq!(render(s.node(), 4), vec![0.3, 0.4, 0.5, 0.0]);
    }

    #[test]
    fn discard_policy_drops_queue_on_stop() {
        let mut s = scheduler(StopPolicy::Discard);
        s.enqueue(vec![0.1, 0.2, 0.3]);
        s.enqueue(vec![0.4]);
        s.start().unwrap();
        render(s.node(), 1);
        assert_eq!(s.stop(), 2);

        s.start().unwrap();
        assert_eq!(render(s.node(), 2), vec![0.0, 0.0]);
        s.enqueue(vec![0.9]);
        assert_eq!(render(s.node(), 1), vec![0.9]);
    }

    #[test]
    fn retain_policy_resumes_mid_buffer() {
        let mut s = scheduler(StopPolicy::Retain);
        s.enqueue(vec![0.1, 0.2, 0.3]);
        s.enqueue(vec![0.4]);
        s.start().unwrap();
        assert_eq!(render(s.node(), 1), vec![0.1]);
        assert_eq!(s.stop(), 0);
        assert_eq!(render(s.node(), 2), vec![0.0, 0.0]);

        s.start().unwrap();
        assert_eq!(render(s.node(), 3), vec![0.2, 0.3, 0.4]);
    }

    #[test]
    fn stop_when_never_started_is_a_no_op() {
        let mut s = scheduler(StopPolicy::Discard);
        assert_eq!(s.stop(), 0);
        assert!(!s.is_playing());
    }

    #[test]
    fn pan_applies_to_next_render() {
        let mut s = scheduler(StopPolicy::Discard);
        s.enqueue(vec![1.0, 1.0]);
        s.start().unwrap();
        s.apply_pan(1.0);
        let mut out = [0.0f32; 2];
        s.node().render(&mut out, 2, &mut Vec::new());
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
    }
}
