//! Method-channel command surface.
//!
//! Callers send untyped [`MethodCall`]s (method name + JSON arguments) and get a
//! [`MethodResponse`] back. Calls are executed one at a time on a dedicated worker thread
//! that owns the [`PlayerController`]; events flow back on a separate channel.

use std::thread;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::controller::{InitializeArgs, PlayerController, VolumeArgs};
use crate::engine::AudioEngine;
use crate::error::PlayerError;
use crate::status::PlayerEvent;

pub const INITIALIZE_PLAYER: &str = "initializePlayer";
pub const START_PLAYER: &str = "startPlayer";
pub const STOP_PLAYER: &str = "stopPlayer";
pub const WRITE_CHUNK: &str = "writeChunk";
pub const SET_STEREO_VOLUME: &str = "setStereoVolume";

/// One command from the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// Result of one command.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResponse {
    Success {
        result: Value,
    },
    Error {
        code: String,
        message: String,
        details: Option<Value>,
    },
    NotImplemented {
        method: String,
    },
}

impl MethodResponse {
    pub fn success(result: impl Into<Value>) -> Self {
        MethodResponse::Success {
            result: result.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MethodResponse::Success { .. })
    }
}

impl From<PlayerError> for MethodResponse {
    fn from(err: PlayerError) -> Self {
        match err {
            PlayerError::UnknownCommand(method) => MethodResponse::NotImplemented { method },
            other => MethodResponse::Error {
                code: other.code().to_string(),
                message: other.message().to_string(),
                details: None,
            },
        }
    }
}

fn arguments_object<'a>(
    args: &'a Value,
    err: fn(String) -> PlayerError,
) -> Result<&'a Map<String, Value>, PlayerError> {
    args.as_object()
        .ok_or_else(|| err("Incorrect parameters".to_string()))
}

/// Read an optional numeric field; `null` counts as absent.
fn optional_number(
    obj: &Map<String, Value>,
    key: &str,
    err: fn(String) -> PlayerError,
) -> Result<Option<f64>, PlayerError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| err(format!("{key} must be a number"))),
    }
}

pub fn parse_initialize(args: &Value) -> Result<InitializeArgs, PlayerError> {
    let obj = arguments_object(args, PlayerError::Configuration)?;
    let sample_rate = optional_number(obj, "sampleRate", PlayerError::Configuration)?;
    let show_logs = match obj.get("showLogs") {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.as_bool().ok_or_else(|| {
            PlayerError::Configuration("showLogs must be a boolean".to_string())
        })?),
    };
    Ok(InitializeArgs {
        sample_rate,
        show_logs,
    })
}

/// Extract the chunk bytes from `{ "data": [u8, ...] }`.
pub fn parse_write_chunk(args: &Value) -> Result<Vec<u8>, PlayerError> {
    let malformed = || PlayerError::BufferWrite("Failed to write Player buffer".to_string());
    let obj = arguments_object(args, PlayerError::BufferWrite)?;
    let data = obj.get("data").and_then(Value::as_array).ok_or_else(malformed)?;
    data.iter()
        .map(|v| {
            v.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| PlayerError::BufferWrite("data must contain bytes (0-255)".to_string()))
        })
        .collect()
}

pub fn parse_volume(args: &Value) -> Result<VolumeArgs, PlayerError> {
    let obj = arguments_object(args, PlayerError::Volume)?;
    let left_gain = optional_number(obj, "leftGain", PlayerError::Volume)?;
    let right_gain = optional_number(obj, "rightGain", PlayerError::Volume)?;
    Ok(VolumeArgs {
        left_gain: left_gain.map(|g| g as f32),
        right_gain: right_gain.map(|g| g as f32),
    })
}

/// Execute one call against `controller`. Malformed input never reaches the controller.
pub fn dispatch<E: AudioEngine>(
    controller: &mut PlayerController<E>,
    call: &MethodCall,
) -> MethodResponse {
    let outcome = match call.method.as_str() {
        INITIALIZE_PLAYER => parse_initialize(&call.arguments)
            .and_then(|args| controller.initialize(args))
            .map(|()| Value::Null),
        START_PLAYER => controller.start().map(|()| Value::Bool(true)),
        STOP_PLAYER => {
            controller.stop();
            Ok(Value::Bool(true))
        }
        WRITE_CHUNK => parse_write_chunk(&call.arguments)
            .and_then(|bytes| controller.push_chunk(&bytes))
            .map(|_| Value::Bool(true)),
        SET_STEREO_VOLUME => parse_volume(&call.arguments).map(|args| {
            controller.set_volume(args);
            Value::Bool(true)
        }),
        other => {
            tracing::warn!(method = other, "unrecognized method");
            Err(PlayerError::UnknownCommand(other.to_string()))
        }
    };

    match outcome {
        Ok(result) => MethodResponse::Success { result },
        Err(e) => {
            if !matches!(e, PlayerError::UnknownCommand(_)) {
                tracing::warn!(method = %call.method, error = %e, "method failed");
            }
            e.into()
        }
    }
}

struct Request {
    call: MethodCall,
    reply: Sender<MethodResponse>,
}

/// Handle for sending commands to the player worker. Cloneable; the worker exits once every
/// handle is dropped.
#[derive(Clone)]
pub struct PlayerHandle {
    cmd_tx: Sender<Request>,
}

impl PlayerHandle {
    /// Send a call and wait for its response. Never waits for audio to play.
    pub fn call(&self, call: MethodCall) -> Result<MethodResponse> {
        let (reply, reply_rx) = crossbeam_channel::bounded(1);
        self.cmd_tx
            .send(Request { call, reply })
            .map_err(|_| anyhow!("player worker stopped"))?;
        reply_rx.recv().context("player worker dropped the call")
    }

    pub fn invoke(&self, method: &str, arguments: Value) -> Result<MethodResponse> {
        self.call(MethodCall::new(method, arguments))
    }
}

/// Spawn the player worker thread.
///
/// `make_engine` runs on the worker thread, so engines that are not `Send` (CPAL streams on
/// some hosts) can be used. Returns once the engine has been built, together with the
/// receiver for player events.
pub fn spawn_player<E, F>(
    config: EngineConfig,
    make_engine: F,
) -> Result<(PlayerHandle, Receiver<PlayerEvent>)>
where
    E: AudioEngine + 'static,
    F: FnOnce(&EngineConfig) -> Result<E> + Send + 'static,
{
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded::<Request>();
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

    thread::Builder::new()
        .name("sound-stream-player".to_string())
        .spawn(move || {
            let engine = match make_engine(&config) {
                Ok(engine) => engine,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("{e:#}")));
                    return;
                }
            };
            let mut controller = PlayerController::new(engine, &config, event_tx);
            let _ = ready_tx.send(Ok(()));
            tracing::info!(
                output_rate_hz = config.output.sample_rate,
                stop_policy = ?config.stop_policy,
                "player worker ready"
            );

            while let Ok(req) = cmd_rx.recv() {
                let response = dispatch(&mut controller, &req.call);
                let _ = req.reply.send(response);
            }
            tracing::info!("player worker exiting");
        })
        .context("spawn player worker")?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok((PlayerHandle { cmd_tx }, event_rx)),
        Ok(Err(e)) => Err(anyhow!("engine init failed: {e}")),
        Err(_) => Err(anyhow!("player worker exited during startup")),
    }
}
