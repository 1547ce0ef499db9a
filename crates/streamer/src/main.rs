//! Streamer: plays a WAV or MP3 stream (URL or file) through the staged pipeline.
//!
//! ## Pipeline
//! 1. **Fetch**: a worker thread pulls bytes from the source into a ring buffer.
//! 2. **Decode**: a worker thread turns WAV/MP3 bytes into 16-bit PCM.
//! 3. **Playback**: CPAL pulls PCM from the playback ring without blocking.
//!
//! The controller moves bytes between stages on every tick, never more than the next
//! stage has room for.
//!
//! ## Modes
//! - `play`: the full pipeline.
//! - `play-wav`: WAV only, fed straight into the playback stage.
//! - `list-devices`: print output devices.

mod cli;
mod config;
mod runtime;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,streamer=info,stream_player=info")
        }))
        .init();

    let output = config::OutputConfig::from_args(&args);
    match args.cmd {
        cli::Command::ListDevices => runtime::list_devices(),
        cli::Command::Play { source, format } => runtime::run_play(config::PlayConfig {
            source,
            media_file_type: format.map(Into::into),
            output,
        }),
        cli::Command::PlayWav { source } => runtime::run_play_wav(config::PlayWavConfig { source, output }),
    }
}
