//! CLI runtime: device listing, file playback, and the JSON-line method server.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sound_stream::device;
use sound_stream::engine::{AudioEngine, NullEngine};
use sound_stream::method::{self, MethodCall, MethodResponse, PlayerHandle};
use sound_stream::playback::CpalEngine;
use sound_stream::status::{PLATFORM_EVENT_METHOD, PlatformEvent, PlaybackState, PlayerEvent};

use crate::config::ResolvedConfig;

/// Render quantum of the null sink, in output frames.
const NULL_QUANTUM_FRAMES: usize = 256;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Start the player worker on either the device engine or the null sink.
pub fn spawn(config: &ResolvedConfig) -> Result<(PlayerHandle, Receiver<PlayerEvent>)> {
    let null_output = config.null_output;
    method::spawn_player(config.engine.clone(), move |cfg| {
        let engine: Box<dyn AudioEngine> = if null_output {
            Box::new(NullEngine::new(cfg.output, NULL_QUANTUM_FRAMES))
        } else {
            Box::new(CpalEngine::new(cfg.output, cfg.device.clone()))
        };
        Ok(engine)
    })
}

/// Options for `play`.
#[derive(Debug, Clone)]
pub struct PlayOptions {
    pub sample_rate: f64,
    pub chunk_bytes: usize,
    pub realtime: bool,
    pub left_gain: Option<f32>,
    pub right_gain: Option<f32>,
    pub show_logs: bool,
}

fn expect_success(resp: MethodResponse) -> Result<Value> {
    match resp {
        MethodResponse::Success { result } => Ok(result),
        MethodResponse::Error { code, message, .. } => bail!("{code}: {message}"),
        MethodResponse::NotImplemented { method } => bail!("not implemented: {method}"),
    }
}

/// Split `bytes` into even-sized chunks of at most `chunk_bytes`.
fn split_chunks(bytes: &[u8], chunk_bytes: usize) -> Result<std::slice::Chunks<'_, u8>> {
    if chunk_bytes == 0 || chunk_bytes % 2 != 0 {
        bail!("--chunk-bytes must be a positive even number, got {chunk_bytes}");
    }
    Ok(bytes.chunks(chunk_bytes))
}

/// Stream a raw PCM file through the method channel and wait for it to finish playing.
pub fn run_play(config: &ResolvedConfig, path: &Path, opts: &PlayOptions) -> Result<()> {
    let mut pcm = std::fs::read(path).with_context(|| format!("read {:?}", path))?;
    if pcm.len() % 2 != 0 {
        tracing::warn!(bytes = pcm.len(), "odd-length file; dropping trailing byte");
        pcm.pop();
    }
    let chunks = split_chunks(&pcm, opts.chunk_bytes)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = interrupted.clone();
    let _ = ctrlc::set_handler(move || {
        interrupted_signal.store(true, Ordering::Relaxed);
    });

    let (player, events) = spawn(config)?;
    expect_success(player.invoke(
        method::INITIALIZE_PLAYER,
        json!({ "sampleRate": opts.sample_rate, "showLogs": opts.show_logs }),
    )?)?;
    if opts.left_gain.is_some() || opts.right_gain.is_some() {
        expect_success(player.invoke(
            method::SET_STEREO_VOLUME,
            json!({ "leftGain": opts.left_gain, "rightGain": opts.right_gain }),
        )?)?;
    }
    expect_success(player.invoke(method::START_PLAYER, Value::Null)?)?;

    tracing::info!(
        path = ?path,
        bytes = pcm.len(),
        input_rate_hz = opts.sample_rate,
        "streaming file"
    );

    let started = Instant::now();
    let mut written_bytes = 0usize;
    let mut buffers = 0u64;
    for chunk in chunks {
        if interrupted.load(Ordering::Relaxed) {
            break;
        }
        expect_success(player.invoke(method::WRITE_CHUNK, json!({ "data": chunk }))?)?;
        written_bytes += chunk.len();
        buffers += 1;

        if opts.realtime {
            let played = Duration::from_secs_f64((written_bytes / 2) as f64 / opts.sample_rate);
            if let Some(ahead) = played.checked_sub(started.elapsed()) {
                std::thread::sleep(ahead);
            }
        }
    }

    let consumed = wait_for_buffers(&events, buffers, &interrupted);
    if consumed < buffers {
        tracing::info!(consumed, buffers, "playback interrupted");
    }
    expect_success(player.invoke(method::STOP_PLAYER, Value::Null)?)?;
    Ok(())
}

/// Block until `total` buffers were consumed, the user interrupts, or the stream stalls.
fn wait_for_buffers(events: &Receiver<PlayerEvent>, total: u64, interrupted: &AtomicBool) -> u64 {
    const STALL_TIMEOUT: Duration = Duration::from_secs(5);
    let mut consumed = 0u64;
    let mut last_progress = Instant::now();

    while consumed < total && !interrupted.load(Ordering::Relaxed) {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(PlayerEvent::BufferConsumed { .. }) => {
                consumed += 1;
                last_progress = Instant::now();
            }
            Ok(PlayerEvent::StreamError(message)) => {
                tracing::warn!(error = %message, "output stream error");
            }
            Ok(PlayerEvent::Status(state)) => {
                tracing::debug!(status = %state, "player status");
                if state == PlaybackState::Stopped {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if last_progress.elapsed() > STALL_TIMEOUT {
                    tracing::warn!(consumed, total, "no playback progress; giving up");
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    consumed
}

/// One JSON line on stdin.
#[derive(Debug, Deserialize)]
struct IncomingCall {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    arguments: Value,
}

/// One JSON line on stdout.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outgoing {
    Response {
        id: Value,
        response: MethodResponse,
    },
    Event {
        method: &'static str,
        arguments: PlatformEvent,
    },
}

fn write_line(out: &Outgoing) -> Result<()> {
    let line = serde_json::to_string(out).context("encode output line")?;
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    writeln!(lock, "{line}").context("write stdout")?;
    lock.flush().context("flush stdout")
}

fn parse_incoming(line: &str) -> std::result::Result<(Value, MethodCall), String> {
    let incoming: IncomingCall = serde_json::from_str(line).map_err(|e| e.to_string())?;
    Ok((
        incoming.id,
        MethodCall::new(incoming.method, incoming.arguments),
    ))
}

/// Serve method calls from stdin until EOF.
pub fn run_serve(config: &ResolvedConfig) -> Result<()> {
    let (player, events) = spawn(config)?;

    let forwarder = std::thread::Builder::new()
        .name("event-forwarder".to_string())
        .spawn(move || {
            for event in events.iter() {
                let out = Outgoing::Event {
                    method: PLATFORM_EVENT_METHOD,
                    arguments: PlatformEvent::from(event),
                };
                if let Err(e) = write_line(&out) {
                    tracing::warn!("event write failed: {e:#}");
                    break;
                }
            }
        })
        .context("spawn event forwarder")?;

    tracing::info!("serving method calls on stdin");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let out = match parse_incoming(&line) {
            Ok((id, call)) => Outgoing::Response {
                id,
                response: player.call(call)?,
            },
            Err(e) => {
                tracing::warn!(error = %e, "malformed request line");
                Outgoing::Response {
                    id: Value::Null,
                    response: MethodResponse::Error {
                        code: "InvalidRequest".to_string(),
                        message: e,
                        details: None,
                    },
                }
            }
        };
        write_line(&out)?;
    }

    drop(player);
    let _ = forwarder.join();
    Ok(())
}
