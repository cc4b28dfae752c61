//! Streaming PCM playback.
//!
//! Callers push raw little-endian `i16` mono chunks at a declared rate; the pipeline converts
//! each chunk to the engine's `f32` output format, queues it for gapless playback on a single
//! output node, and applies a pan derived from independent left/right gains.
//!
//! ## Pipeline
//! 1. **Convert** (`convert`): decode + normalize + linear resample, per chunk, no state.
//! 2. **Schedule** (`scheduler`, `queue`): append to a FIFO shared with the render context.
//! 3. **Render** (`node`, `engine`, `playback`): the device callback drains the FIFO in order
//!    and applies the pan law.
//!
//! The caller-facing surface is [`method`]: [`method::spawn_player`] runs a
//! [`controller::PlayerController`] on its own thread and returns a handle plus an event
//! receiver.

pub mod config;
pub mod controller;
pub mod convert;
pub mod device;
pub mod engine;
pub mod error;
pub mod method;
pub mod node;
pub mod pan;
pub mod playback;
pub mod queue;
pub mod scheduler;
pub mod status;
