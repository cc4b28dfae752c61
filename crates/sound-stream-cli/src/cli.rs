use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sound_stream::config::StopPolicy;

#[derive(Parser, Debug)]
#[command(name = "sound-stream", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// TOML config file; explicit flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Engine output sample rate in Hz (default 32000)
    #[arg(long)]
    pub output_rate: Option<u32>,

    /// What stop does to queued audio: discard | retain
    #[arg(long)]
    pub stop_policy: Option<StopPolicy>,

    /// Render to a paced null sink instead of an audio device
    #[arg(long)]
    pub null_output: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream a raw s16le mono PCM file through the player
    Play {
        /// Path to raw PCM (16-bit signed little-endian, mono)
        path: PathBuf,

        /// Sample rate of the file in Hz
        #[arg(long, default_value_t = 16_000.0)]
        sample_rate: f64,

        /// Bytes per writeChunk call (must be even)
        #[arg(long, default_value_t = 4096)]
        chunk_bytes: usize,

        /// Pace writes at the file's real-time rate instead of queueing everything up front
        #[arg(long)]
        realtime: bool,

        #[arg(long)]
        left_gain: Option<f32>,

        #[arg(long)]
        right_gain: Option<f32>,

        /// Ask the player to log every operation at info level
        #[arg(long)]
        show_logs: bool,
    },

    /// Serve JSON-line method calls on stdin; responses and events go to stdout
    Serve,
}
