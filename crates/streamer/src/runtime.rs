//! Streamer runtime: device listing and the controller tick loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use stream_player::controller::MediaPlayer;
use stream_player::device;
use stream_player::events::StageError;
use stream_player::fetch::Source;
use stream_player::net::{Connector, HttpConnector};
use stream_player::playback::{CpalOutput, PlaybackStage, Speaker};
use stream_player::status::elapsed_ms;
use stream_player_types::{PlaybackState, PlayerStatus};

use crate::config::{OutputConfig, PlayConfig, PlayWavConfig};

const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    for d in device::list_devices(&host)? {
        let marker = if d.is_default { "*" } else { " " };
        println!(
            "{marker} {}  ({}-{} Hz, up to {} ch)",
            d.name, d.min_rate, d.max_rate, d.max_channels
        );
    }
    Ok(())
}

/// Stream one source through the full pipeline until it ends or Ctrl-C.
pub fn run_play(config: PlayConfig) -> Result<()> {
    let interrupted = install_stop_handler();
    let connector: Arc<dyn Connector> = Arc::new(HttpConnector::default());
    let speaker = build_speaker(&config.output, connector.clone())?;
    let mut player = MediaPlayer::new(speaker, config.output.pipeline.clone(), connector);

    let source = load_source(&config.source)?;
    player.play_source(source, config.media_file_type)?;

    let mut reporter = StatusReporter::new(config.output.status_json);
    let mut stop_sent = false;
    loop {
        player.tick();
        if interrupted.load(Ordering::Acquire) && !stop_sent {
            tracing::info!("interrupted; stopping");
            player.stop();
            stop_sent = true;
        }
        let status = player.status();
        reporter.maybe_print(&status)?;
        if status.state == PlaybackState::Idle {
            if status.warning {
                tracing::warn!("playback ended with warnings");
            }
            break;
        }
        std::thread::sleep(config.output.tick);
    }
    reporter.print(&player.status())?;
    Ok(())
}

/// Play a WAV file or URL through the playback stage's feed task.
pub fn run_play_wav(config: PlayWavConfig) -> Result<()> {
    let interrupted = install_stop_handler();
    let connector: Arc<dyn Connector> = Arc::new(HttpConnector::default());
    let mut speaker = build_speaker(&config.output, connector)?;

    match load_source(&config.source)? {
        Source::LocalBytes(bytes) => speaker.play_file(bytes)?,
        Source::RemoteUri(uri) => speaker.play_url(uri)?,
    }

    let mut reporter = StatusReporter::new(config.output.status_json);
    let mut warned = false;
    loop {
        while let Some(event) = speaker.read_event() {
            if let Some(err) = event.error {
                tracing::warn!("playback warning: {err}");
                warned = true;
                if err == StageError::Output {
                    speaker.stop();
                    return Err(anyhow!("audio output unavailable"));
                }
            }
        }
        if interrupted.load(Ordering::Acquire) {
            tracing::info!("interrupted; stopping");
            break;
        }
        let feeding = speaker.is_feeding();
        reporter.maybe_print(&feed_status(&speaker, feeding, warned))?;
        if !feeding && !speaker.has_buffered_data() {
            break;
        }
        std::thread::sleep(config.output.tick);
    }
    speaker.stop();
    reporter.print(&feed_status(&speaker, false, warned))?;
    Ok(())
}

fn build_speaker(output: &OutputConfig, connector: Arc<dyn Connector>) -> Result<PlaybackStage> {
    let factory = CpalOutput::factory(output.device.clone());
    PlaybackStage::new(&output.pipeline, factory, connector).context("create playback stage")
}

/// URLs stream over HTTP; anything else is read from disk.
fn load_source(source: &str) -> Result<Source> {
    let lower = source.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(Source::RemoteUri(source.to_string()));
    }
    let bytes = std::fs::read(source).with_context(|| format!("read {source}"))?;
    tracing::info!(path = %source, bytes = bytes.len(), "loaded local file");
    Ok(Source::LocalBytes(bytes.into()))
}

fn feed_status(speaker: &PlaybackStage, feeding: bool, warning: bool) -> PlayerStatus {
    let stats = speaker.stats();
    PlayerStatus {
        state: if feeding { PlaybackState::Playing } else { PlaybackState::Idle },
        warning,
        media_type: Some("wav".to_string()),
        format: speaker.stream_info().map(Into::into),
        played_frames: stats.played_frames,
        underrun_frames: stats.underrun_frames,
        underrun_events: stats.underrun_events,
        buffered_bytes: stats.buffered_bytes,
        ..PlayerStatus::default()
    }
}

/// First Ctrl-C asks for a stop; a second one exits immediately.
fn install_stop_handler() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let for_signal = flag.clone();
    let _ = ctrlc::set_handler(move || {
        if for_signal.swap(true, Ordering::AcqRel) {
            std::process::exit(130);
        }
    });
    flag
}

struct StatusReporter {
    enabled: bool,
    last: Option<Instant>,
}

impl StatusReporter {
    fn new(enabled: bool) -> Self {
        Self { enabled, last: None }
    }

    fn maybe_print(&mut self, status: &PlayerStatus) -> Result<()> {
        if self.last.is_some_and(|t| t.elapsed() < STATUS_INTERVAL) {
            return Ok(());
        }
        self.print(status)
    }

    fn print(&mut self, status: &PlayerStatus) -> Result<()> {
        self.last = Some(Instant::now());
        if self.enabled {
            println!("{}", serde_json::to_string(status)?);
        } else if let Some(ms) = elapsed_ms(status) {
            tracing::debug!(state = ?status.state, elapsed_ms = ms, "status");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_streamed_and_paths_are_read() {
        assert!(matches!(
            load_source("HTTP://radio.example/live.mp3").unwrap(),
            Source::RemoteUri(_)
        ));

        let path = std::env::temp_dir().join(format!("streamer-load-{}.wav", std::process::id()));
        std::fs::write(&path, b"RIFF").unwrap();
        let loaded = load_source(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();
        match loaded {
            Source::LocalBytes(bytes) => assert_eq!(&bytes[..], b"RIFF"),
            other => panic!("unexpected source: {other:?}"),
        }

        assert!(load_source("/definitely/not/here.wav").is_err());
    }
}
