//! sound-stream: streams raw PCM chunks to an output device through the player's method
//! channel.
//!
//! ## Modes
//! - `play`: stream a raw s16le mono file chunk by chunk and wait until it has been heard.
//! - `serve`: read JSON-line method calls on stdin, write responses and `platformEvent`s to
//!   stdout (logs go to stderr).

mod cli;
mod config;
mod runtime;

use anyhow::{Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,sound_stream=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let file = args
        .config
        .as_deref()
        .map(config::FileConfig::load)
        .transpose()?;
    let resolved = config::resolve(&args, file.as_ref());
    tracing::info!(
        output_rate_hz = resolved.engine.output.sample_rate,
        stop_policy = ?resolved.engine.stop_policy,
        device = resolved.engine.device.as_deref().unwrap_or("default"),
        null_output = resolved.null_output,
        "sound-stream starting"
    );

    match &args.cmd {
        Some(cli::Command::Play {
            path,
            sample_rate,
            chunk_bytes,
            realtime,
            left_gain,
            right_gain,
            show_logs,
        }) => runtime::run_play(
            &resolved,
            path,
            &runtime::PlayOptions {
                sample_rate: *sample_rate,
                chunk_bytes: *chunk_bytes,
                realtime: *realtime,
                left_gain: *left_gain,
                right_gain: *right_gain,
                show_logs: *show_logs,
            },
        ),
        Some(cli::Command::Serve) => runtime::run_serve(&resolved),
        None => bail!("no command given (try `play <file>` or `serve`)"),
    }
}
