//! Player controller: the state machine behind the command surface.
//!
//! Owns the input format, the gain state and the scheduler. Every state transition is
//! reported as a [`PlayerEvent::Status`] before the triggering operation returns.

use crossbeam_channel::Sender;

use crate::config::{
    EngineConfig, MAX_INPUT_SAMPLE_RATE, MIN_INPUT_SAMPLE_RATE, OutputFormat, PlayerConfig,
};
use crate::convert;
use crate::engine::AudioEngine;
use crate::error::PlayerError;
use crate::pan::GainState;
use crate::scheduler::PlaybackScheduler;
use crate::status::{PlaybackState, PlayerEvent};

/// Log at `info` when the caller asked for logs, `debug` otherwise.
macro_rules! op_log {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

/// Arguments of `initializePlayer`; absent values keep their previous setting.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InitializeArgs {
    pub sample_rate: Option<f64>,
    pub show_logs: Option<bool>,
}

/// Arguments of `setStereoVolume`; absent values keep their previous setting.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VolumeArgs {
    pub left_gain: Option<f32>,
    pub right_gain: Option<f32>,
}

pub struct PlayerController<E: AudioEngine> {
    scheduler: PlaybackScheduler<E>,
    output: OutputFormat,
    /// `None` until the first successful initialize.
    input: Option<PlayerConfig>,
    /// Rate a missing `sampleRate` falls back to.
    last_sample_rate: f64,
    gains: GainState,
    state: PlaybackState,
    debug_logging: bool,
    events: Sender<PlayerEvent>,
}

impl<E: AudioEngine> PlayerController<E> {
    pub fn new(engine: E, config: &EngineConfig, events: Sender<PlayerEvent>) -> Self {
        let scheduler = PlaybackScheduler::new(engine, config.stop_policy, Some(events.clone()));
        Self {
            scheduler,
            output: config.output,
            input: None,
            last_sample_rate: PlayerConfig::default().sample_rate_hz,
            gains: GainState::default(),
            state: PlaybackState::Unset,
            debug_logging: false,
            events,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn input_config(&self) -> Option<PlayerConfig> {
        self.input
    }

    pub fn gains(&self) -> GainState {
        self.gains
    }

    pub fn scheduler(&self) -> &PlaybackScheduler<E> {
        &self.scheduler
    }

    pub fn debug_logging(&self) -> bool {
        self.debug_logging
    }

    fn set_state(&mut self, state: PlaybackState) {
        self.state = state;
        let _ = self.events.send(PlayerEvent::Status(state));
    }

    /// Store the input format and enter `Initialized`.
    ///
    /// Only the input format changes: a playing node keeps rendering its queue, and chunks
    /// pushed afterwards convert from the new rate. Invalid rates are rejected before
    /// anything changes.
    pub fn initialize(&mut self, args: InitializeArgs) -> Result<(), PlayerError> {
        let rate = args.sample_rate.unwrap_or(self.last_sample_rate);
        let input = PlayerConfig::new(rate).ok_or_else(|| {
            PlayerError::Configuration(format!(
                "sampleRate must be between {MIN_INPUT_SAMPLE_RATE} and {MAX_INPUT_SAMPLE_RATE} Hz, got {rate}"
            ))
        })?;

        if let Some(show) = args.show_logs {
            self.debug_logging = show;
        }

        self.last_sample_rate = input.sample_rate_hz;
        self.input = Some(input);
        op_log!(
            self.debug_logging,
            input_rate_hz = input.sample_rate_hz,
            output_rate_hz = self.output.sample_rate,
            "player initialized"
        );
        self.set_state(PlaybackState::Initialized);
        Ok(())
    }

    /// Start the engine and the node (both idempotent), then enter `Playing`.
    pub fn start(&mut self) -> Result<(), PlayerError> {
        if let Err(e) = self.scheduler.start() {
            tracing::warn!(error = %e, "player start failed");
            return Err(e);
        }
        op_log!(self.debug_logging, "player started");
        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    /// Hard-stop the node and enter `Stopped`. Always succeeds.
    pub fn stop(&mut self) {
        let dropped = self.scheduler.stop();
        op_log!(self.debug_logging, dropped_buffers = dropped, "player stopped");
        self.set_state(PlaybackState::Stopped);
    }

    /// Convert one chunk and queue it for playback.
    ///
    /// Returns the buffer's sequence number, or `None` for an empty chunk. Rejected chunks
    /// leave the queue untouched.
    pub fn push_chunk(&mut self, bytes: &[u8]) -> Result<Option<u64>, PlayerError> {
        let input = self
            .input
            .ok_or_else(|| PlayerError::BufferWrite("player is not initialized".to_string()))?;
        let samples = convert::convert_chunk(bytes, &input, &self.output)
            .map_err(|e| PlayerError::BufferWrite(e.to_string()))?;
        let frames = samples.len();
        let sequence = self.scheduler.enqueue(samples);
        op_log!(
            self.debug_logging,
            bytes = bytes.len(),
            frames,
            sequence = ?sequence,
            queued_frames = self.scheduler.node().queue().len_frames(),
            "chunk scheduled"
        );
        Ok(sequence)
    }

    /// Update the gains and apply the derived pan to the live node. Returns the new pan.
    pub fn set_volume(&mut self, args: VolumeArgs) -> f32 {
        self.gains.update(args.left_gain, args.right_gain);
        let pan = self.gains.pan();
        op_log!(
            self.debug_logging,
            left_gain = self.gains.left,
            right_gain = self.gains.right,
            pan,
            "stereo volume set"
        );
        self.scheduler.apply_pan(pan);
        pan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StopPolicy;
    use crate::scheduler::tests::{ManualEngine, render};
    use crossbeam_channel::Receiver;

    fn controller_with(
        engine: ManualEngine,
        policy: StopPolicy,
    ) -> (PlayerController<ManualEngine>, Receiver<PlayerEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let cfg = EngineConfig {
            stop_policy: policy,
            ..EngineConfig::default()
        };
        (PlayerController::new(engine, &cfg, tx), rx)
    }

    fn controller() -> (PlayerController<ManualEngine>, Receiver<PlayerEvent>) {
        controller_with(ManualEngine::default(), StopPolicy::Discard)
    }

    fn statuses(rx: &Receiver<PlayerEvent>) -> Vec<PlaybackState> {
        rx.try_iter()
            .filter_map(|e| match e {
                PlayerEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn le_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn init(c: &mut PlayerController<ManualEngine>, rate: f64) {
        c.initialize(InitializeArgs {
            sample_rate: Some(rate),
            show_logs: None,
        })
        .unwrap();
    }

    #[test]
    fn starts_unset() {
        let (c, rx) = controller();
        assert_eq!(c.state(), PlaybackState::Unset);
        assert!(c.input_config().is_none());
        assert!(statuses(&rx).is_empty());
    }

    #[test]
    fn initialize_then_start_emits_in_order() {
        let (mut c, rx) = controller();
        init(&mut c, 16_000.0);
        c.start().unwrap();
        assert_eq!(
            statuses(&rx),
            vec![PlaybackState::Initialized, PlaybackState::Playing]
        );
        assert_eq!(c.state(), PlaybackState::Playing);
    }

    #[test]
    fn initialize_without_rate_uses_previous_value() {
        let (mut c, _rx) = controller();
        c.initialize(InitializeArgs::default()).unwrap();
        assert_eq!(c.input_config().unwrap().sample_rate_hz, 16_000.0);

        init(&mut c, 44_100.0);
        c.initialize(InitializeArgs::default()).unwrap();
        assert_eq!(c.input_config().unwrap().sample_rate_hz, 44_100.0);
    }

    #[test]
    fn invalid_rate_leaves_state_unchanged() {
        let (mut c, rx) = controller();
        init(&mut c, 16_000.0);
        c.start().unwrap();
        let _ = statuses(&rx);

        let err = c
            .initialize(InitializeArgs {
                sample_rate: Some(0.0),
                show_logs: Some(true),
            })
            .unwrap_err();
        assert_eq!(err.code(), "ConfigurationError");
        assert_eq!(c.state(), PlaybackState::Playing);
        assert_eq!(c.input_config().unwrap().sample_rate_hz, 16_000.0);
        assert!(!c.debug_logging());
        assert!(statuses(&rx).is_empty());
    }

    #[test]
    fn show_logs_flag_is_sticky() {
        let (mut c, _rx) = controller();
        c.initialize(InitializeArgs {
            sample_rate: None,
            show_logs: Some(true),
        })
        .unwrap();
        c.initialize(InitializeArgs::default()).unwrap();
        assert!(c.debug_logging());
    }

    #[test]
    fn reinitialize_while_playing_keeps_rendering() {
        let (mut c, rx) = controller();
        init(&mut c, 32_000.0);
        c.start().unwrap();
        c.push_chunk(&le_bytes(&[0x4000, 0x4000])).unwrap();
        init(&mut c, 16_000.0);

        assert_eq!(c.state(), PlaybackState::Initialized);
        assert!(c.scheduler().is_playing());
        assert_eq!(c.scheduler().node().queue().len_frames(), 2);

        c.push_chunk(&le_bytes(&[0x4000])).unwrap();
        assert_eq!(render(c.scheduler().node(), 4), vec![0.5; 4]);
        assert_eq!(
            statuses(&rx),
            vec![
                PlaybackState::Initialized,
                PlaybackState::Playing,
                PlaybackState::Initialized
            ]
        );
    }

    #[test]
    fn out_of_range_rate_is_a_configuration_error() {
        let (mut c, rx) = controller();
        for rate in [1e-12, 0.5, 1e9] {
            let err = c
                .initialize(InitializeArgs {
                    sample_rate: Some(rate),
                    show_logs: None,
                })
                .unwrap_err();
            assert_eq!(err.code(), "ConfigurationError");
        }
        assert!(c.input_config().is_none());
        assert!(statuses(&rx).is_empty());
    }

    #[test]
    fn oversized_chunk_is_a_buffer_write_error() {
        let (mut c, _rx) = controller();
        init(&mut c, 1.0);
        let err = c.push_chunk(&le_bytes(&[0; 1_000])).unwrap_err();
        assert_eq!(err.code(), "BufferWriteError");
        assert!(c.scheduler().node().queue().is_empty());
    }

    #[test]
    fn stop_without_start_emits_stopped() {
        let (mut c, rx) = controller();
        c.stop();
        c.stop();
        assert_eq!(
            statuses(&rx),
            vec![PlaybackState::Stopped, PlaybackState::Stopped]
        );
    }

    #[test]
    fn start_failure_emits_nothing() {
        let (mut c, rx) = controller_with(ManualEngine::failing(), StopPolicy::Discard);
        init(&mut c, 16_000.0);
        let _ = statuses(&rx);

        let err = c.start().unwrap_err();
        assert_eq!(err.code(), "PlaybackStartError");
        assert_eq!(c.state(), PlaybackState::Initialized);
        assert!(statuses(&rx).is_empty());
    }

    #[test]
    fn push_before_initialize_is_rejected() {
        let (mut c, _rx) = controller();
        let err = c.push_chunk(&le_bytes(&[1, 2])).unwrap_err();
        assert_eq!(err.code(), "BufferWriteError");
        assert!(c.scheduler().node().queue().is_empty());
    }

    #[test]
    fn odd_length_chunk_is_rejected_without_queueing() {
        let (mut c, _rx) = controller();
        init(&mut c, 32_000.0);
        c.push_chunk(&le_bytes(&[5, 6])).unwrap();
        let err = c.push_chunk(&[0x01, 0x02, 0x03]).unwrap_err();
        assert_eq!(err.code(), "BufferWriteError");
        assert_eq!(c.scheduler().node().queue().len_buffers(), 1);
        assert_eq!(c.scheduler().node().queue().len_frames(), 2);
    }

    #[test]
    fn empty_chunk_is_accepted() {
        let (mut c, _rx) = controller();
        init(&mut c, 16_000.0);
        assert_eq!(c.push_chunk(&[]).unwrap(), None);
    }

    #[test]
    fn pushed_chunks_render_in_order_at_output_rate() {
        let (mut c, rx) = controller();
        init(&mut c, 16_000.0);
        c.push_chunk(&le_bytes(&[16_384, 16_384])).unwrap();
        c.push_chunk(&le_bytes(&[-16_384])).unwrap();
        c.start().unwrap();

        let out = render(c.scheduler().node(), 7);
        assert_eq!(out, vec![0.5, 0.5, 0.5, 0.5, -0.5, -0.5, 0.0]);

        let consumed: Vec<u64> = rx
            .try_iter()
            .filter_map(|e| match e {
                PlayerEvent::BufferConsumed { sequence } => Some(sequence),
                _ => None,
            })
            .collect();
        assert_eq!(consumed, vec![0, 1]);
    }

    #[test]
    fn stop_with_retain_keeps_queue() {
        let (mut c, _rx) = controller_with(ManualEngine::default(), StopPolicy::Retain);
        init(&mut c, 32_000.0);
        c.push_chunk(&le_bytes(&[8_192, 16_384])).unwrap();
        c.start().unwrap();
        assert_eq!(render(c.scheduler().node(), 1), vec![0.25]);
        c.stop();
        c.start().unwrap();
        assert_eq!(render(c.scheduler().node(), 1), vec![0.5]);
    }

    #[test]
    fn set_volume_derives_pan() {
        let (mut c, _rx) = controller();
        let pan = c.set_volume(VolumeArgs {
            left_gain: Some(1.0),
            right_gain: Some(0.5),
        });
        assert_eq!(pan, -0.5);
        assert_eq!(c.scheduler().node().pan(), -0.5);

        let pan = c.set_volume(VolumeArgs {
            left_gain: Some(0.5),
            right_gain: Some(1.0),
        });
        assert_eq!(pan, 0.5);

        let pan = c.set_volume(VolumeArgs {
            left_gain: Some(1.0),
            right_gain: None,
        });
        assert_eq!(pan, 0.0);
        assert_eq!(c.gains(), GainState { left: 1.0, right: 1.0 });
    }

    #[test]
    fn set_volume_while_playing_affects_next_quantum_only() {
        let (mut c, _rx) = controller();
        init(&mut c, 32_000.0);
        c.push_chunk(&le_bytes(&[16_384; 4])).unwrap();
        c.start().unwrap();

        let node = c.scheduler().node().clone();
        let mut first = [0.0f32; 4];
        node.render(&mut first, 2, &mut Vec::new());
        assert!((first[0] - first[1]).abs() < 1e-6);

        c.set_volume(VolumeArgs {
            left_gain: Some(1.0),
            right_gain: Some(0.0),
        });
        let mut second = [0.0f32; 4];
        node.render(&mut second, 2, &mut Vec::new());
        assert!((second[0] - 0.5).abs() < 1e-6);
        assert!(second[1].abs() < 1e-6);
        assert!((first[0] - first[1]).abs() < 1e-6);
    }
}
