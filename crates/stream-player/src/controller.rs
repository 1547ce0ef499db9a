//! Media player state machine.
//!
//! [`MediaPlayer`] owns the fetch and decode stages and a [`Speaker`]. Everything
//! happens on the caller's thread inside [`MediaPlayer::tick`]:
//! 1. drain stage events and update the playback state
//! 2. move bytes from the fetch ring into the decoder, bounded by decoder free space
//! 3. move PCM from the decoder into the speaker, bounded by `free_bytes()`
//!
//! When the fetch stage stops on its own the player drains the pipeline gracefully,
//! waits for the speaker to go quiet and returns to `Idle`.

use std::sync::Arc;

use anyhow::{Context, Result};
use stream_player_types::{PlaybackState, PlayerStatus};

use crate::codec::Mp3FrameDecoder;
use crate::config::PipelineConfig;
use crate::decode::{DecodeStage, FrameDecoderFactory};
use crate::events::{CommandEvent, EventType, MediaFileType, StageError, StreamInfo, TaskEvent};
use crate::fetch::{FetchCommand, FetchStage, Source};
use crate::net::Connector;
use crate::playback::Speaker;

/// Where the active stream is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Streaming,
    /// Fetch finished; ring A is still being flushed into the decoder.
    FetchDone,
    /// `StopGracefully` sent; waiting for the decoder's `Stopped`.
    Draining,
    /// Decoder gone; waiting for the speaker to play out.
    Flushing,
    /// Hard stop sent to both stages.
    Stopping,
}

struct Pipeline {
    fetch: FetchStage,
    decode: DecodeStage,
    phase: Phase,
    fetch_stopped: bool,
    decode_stopped: bool,
}

impl Pipeline {
    fn shutdown(mut self) {
        self.fetch.shutdown();
        self.decode.shutdown();
    }
}

pub struct MediaPlayer<S: Speaker> {
    speaker: S,
    config: PipelineConfig,
    connector: Arc<dyn Connector>,
    frame_decoder: FrameDecoderFactory,
    pipeline: Option<Pipeline>,
    state: PlaybackState,
    warning: bool,
    /// Set by `pause`, cleared by `play`; keeps late `Running` events from undoing it.
    user_paused: bool,
    now_playing: Option<String>,
    media_file_type: MediaFileType,
    stream_info: Option<StreamInfo>,
    transfer: Vec<u8>,
}

impl<S: Speaker> MediaPlayer<S> {
    pub fn new(speaker: S, config: PipelineConfig, connector: Arc<dyn Connector>) -> Self {
        Self::with_frame_decoder(
            speaker,
            config,
            connector,
            Arc::new(|| Box::new(Mp3FrameDecoder::new())),
        )
    }

    pub fn with_frame_decoder(
        speaker: S,
        config: PipelineConfig,
        connector: Arc<dyn Connector>,
        frame_decoder: FrameDecoderFactory,
    ) -> Self {
        let transfer = vec![0u8; config.transfer_bytes.max(1)];
        Self {
            speaker,
            config,
            connector,
            frame_decoder,
            pipeline: None,
            state: PlaybackState::Idle,
            warning: false,
            user_paused: false,
            now_playing: None,
            media_file_type: MediaFileType::None,
            stream_info: None,
            transfer,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn has_warning(&self) -> bool {
        self.warning
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.stream_info
    }

    pub fn speaker(&self) -> &S {
        &self.speaker
    }

    pub fn speaker_mut(&mut self) -> &mut S {
        &mut self.speaker
    }

    /// Start playing `source`. Without an explicit type it is inferred from the
    /// source, falling back to MP3.
    pub fn play_source(&mut self, source: Source, media_file_type: Option<MediaFileType>) -> Result<()> {
        let media_file_type = match media_file_type.unwrap_or_else(|| source.media_file_type()) {
            MediaFileType::None => {
                tracing::debug!(source = %source.describe(), "unknown media type; assuming mp3");
                MediaFileType::Mp3
            }
            known => known,
        };
        tracing::info!(source = %source.describe(), media = ?media_file_type, "play");

        let reuse = self
            .pipeline
            .as_ref()
            .is_some_and(|p| p.phase == Phase::Streaming && p.fetch.is_running() && p.decode.is_running());
        if !reuse {
            self.teardown();
            self.pipeline = Some(self.build_pipeline()?);
        }
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(());
        };

        self.speaker.stop();
        self.speaker.start().context("start speaker")?;
        pipeline.decode.send_command(CommandEvent::Start { media_file_type });
        pipeline.fetch.send_command(FetchCommand::Play {
            source: Some(source.clone()),
            media_file_type,
        });

        self.state = PlaybackState::Starting;
        self.warning = false;
        self.user_paused = false;
        self.now_playing = Some(source.describe());
        self.media_file_type = media_file_type;
        self.stream_info = None;
        Ok(())
    }

    fn build_pipeline(&self) -> Result<Pipeline> {
        let mut fetch = FetchStage::new(&self.config, self.connector.clone())?;
        let mut decode = DecodeStage::with_frame_decoder(&self.config, self.frame_decoder.clone())?;
        fetch.start().context("start fetch stage")?;
        decode.start().context("start decode stage")?;
        Ok(Pipeline {
            fetch,
            decode,
            phase: Phase::Streaming,
            fetch_stopped: false,
            decode_stopped: false,
        })
    }

    /// Resume a paused stream.
    pub fn play(&mut self) {
        if self.state != PlaybackState::Paused {
            return;
        }
        if let Some(p) = &self.pipeline {
            p.fetch.send_command(FetchCommand::Play {
                source: None,
                media_file_type: self.media_file_type,
            });
            self.user_paused = false;
            self.state = PlaybackState::Starting;
        }
    }

    pub fn pause(&mut self) {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Starting) {
            return;
        }
        if let Some(p) = &self.pipeline {
            p.fetch.send_command(FetchCommand::Pause);
            self.user_paused = true;
            self.state = PlaybackState::Paused;
        }
    }

    pub fn toggle(&mut self) {
        if self.state == PlaybackState::Paused {
            self.play();
        } else {
            self.pause();
        }
    }

    /// Hard-stop both stages. The player becomes `Idle` once they report `Stopped`.
    pub fn stop(&mut self) {
        let Some(p) = self.pipeline.as_mut() else {
            self.speaker.stop();
            self.state = PlaybackState::Idle;
            return;
        };
        if p.phase == Phase::Stopping {
            return;
        }
        tracing::info!("stop");
        p.phase = Phase::Stopping;
        if !p.fetch_stopped {
            p.fetch.send_command(FetchCommand::Stop);
        }
        if !p.decode_stopped {
            p.decode.send_command(CommandEvent::Stop);
        }
        self.speaker.stop();
        self.state = PlaybackState::Stopping;
    }

    /// Run one controller cycle.
    pub fn tick(&mut self) {
        self.watch();
        self.pump_fetch_to_decode();
        self.pump_decode_to_speaker();
        self.advance();
    }

    fn watch(&mut self) {
        let mut output_failed = false;
        while let Some(event) = self.speaker.read_event() {
            if event.kind == EventType::Warning {
                tracing::warn!(error = ?event.error, "speaker warning");
                self.warning = true;
                output_failed |= event.error == Some(StageError::Output);
            }
        }
        if output_failed && self.pipeline.is_some() {
            tracing::error!("audio output unavailable; stopping");
            self.stop();
        }
        let Some(p) = self.pipeline.as_mut() else {
            return;
        };

        let mut fetch_events = Vec::new();
        while let Some(event) = p.fetch.read_event() {
            fetch_events.push(event);
        }
        let mut decode_events = Vec::new();
        while let Some(event) = p.decode.read_event() {
            decode_events.push(event);
        }

        for event in fetch_events {
            self.on_fetch_event(event);
        }
        for event in decode_events {
            self.on_decode_event(event);
        }
    }

    fn on_fetch_event(&mut self, event: TaskEvent) {
        let Some(p) = self.pipeline.as_mut() else {
            return;
        };
        match event.kind {
            EventType::Running => {
                if p.phase == Phase::Streaming && !self.user_paused && self.state.has_source() {
                    if self.state != PlaybackState::Playing {
                        tracing::debug!("playing");
                    }
                    self.state = PlaybackState::Playing;
                    self.warning = false;
                }
            }
            EventType::Idle => {
                if self.state == PlaybackState::Playing {
                    self.state = PlaybackState::Paused;
                } else if self.state == PlaybackState::Starting && self.warning {
                    // The source never opened.
                    self.state = PlaybackState::Idle;
                }
            }
            EventType::Warning => {
                tracing::warn!(error = ?event.error, "fetch warning");
                self.warning = true;
            }
            EventType::Stopped => {
                p.fetch_stopped = true;
                if p.phase == Phase::Streaming {
                    tracing::debug!("fetch finished; flushing pipeline");
                    p.phase = Phase::FetchDone;
                }
            }
            EventType::Started | EventType::Stopping => {}
        }
    }

    fn on_decode_event(&mut self, event: TaskEvent) {
        let Some(p) = self.pipeline.as_mut() else {
            return;
        };
        match event.kind {
            EventType::Started => {
                if let Some(info) = event.stream_info {
                    self.speaker.set_stream_info(info);
                    self.stream_info = Some(info);
                }
                if let Some(kind) = event.media_file_type {
                    self.media_file_type = kind;
                }
                p.decode.acknowledge_format();
            }
            EventType::Warning => {
                tracing::warn!(error = ?event.error, "decode warning");
                self.warning = true;
            }
            EventType::Stopped => {
                p.decode_stopped = true;
                match p.phase {
                    Phase::Draining => p.phase = Phase::Flushing,
                    Phase::Streaming | Phase::FetchDone => {
                        // The decoder refused the stream; nothing more can play.
                        tracing::warn!("decoder stopped early");
                        p.phase = Phase::Stopping;
                        if !p.fetch_stopped {
                            p.fetch.send_command(FetchCommand::Stop);
                        }
                        self.speaker.stop();
                        self.state = PlaybackState::Stopping;
                    }
                    Phase::Flushing | Phase::Stopping => {}
                }
            }
            EventType::Running | EventType::Idle | EventType::Stopping => {}
        }
    }

    /// Move container bytes from the fetch ring into the decoder.
    fn pump_fetch_to_decode(&mut self) {
        let Some(p) = self.pipeline.as_mut() else {
            return;
        };
        if !matches!(p.phase, Phase::Streaming | Phase::FetchDone) {
            return;
        }
        let want = p.decode.free_input().min(p.fetch.available()).min(self.transfer.len());
        if want == 0 {
            return;
        }
        let r = p.fetch.read(&mut self.transfer[..want]);
        let w = p.decode.write(&self.transfer[..r.consumed]);
        if w.consumed < r.consumed {
            tracing::warn!(lost = r.consumed - w.consumed, "decoder refused bytes");
        }
    }

    /// Move PCM from the decoder into the speaker.
    fn pump_decode_to_speaker(&mut self) {
        let Some(p) = self.pipeline.as_mut() else {
            return;
        };
        let active = match p.phase {
            Phase::Streaming => self.state == PlaybackState::Playing,
            Phase::FetchDone | Phase::Draining => true,
            Phase::Flushing | Phase::Stopping => false,
        };
        // PCM is held back until the decoder has announced its format.
        if !active || self.stream_info.is_none() {
            return;
        }
        let want = self
            .speaker
            .free_bytes()
            .min(p.decode.available())
            .min(self.transfer.len());
        if want == 0 {
            return;
        }
        let r = p.decode.read(&mut self.transfer[..want]);
        if r.consumed > 0 {
            self.speaker.write(&self.transfer[..r.consumed]);
        }
    }

    fn advance(&mut self) {
        let Some(p) = self.pipeline.as_mut() else {
            return;
        };
        match p.phase {
            Phase::Streaming => {}
            Phase::FetchDone => {
                if p.fetch.available() == 0 {
                    p.decode.send_command(CommandEvent::StopGracefully);
                    p.phase = Phase::Draining;
                }
            }
            Phase::Draining => {}
            Phase::Flushing => {
                if !self.speaker.has_buffered_data() {
                    tracing::info!("stream finished");
                    self.speaker.stop();
                    self.finish();
                }
            }
            Phase::Stopping => {
                if p.fetch_stopped && p.decode_stopped {
                    self.finish();
                }
            }
        }
    }

    fn finish(&mut self) {
        self.teardown();
        self.state = PlaybackState::Idle;
        self.now_playing = None;
        self.user_paused = false;
    }

    fn teardown(&mut self) {
        if let Some(p) = self.pipeline.take() {
            p.shutdown();
        }
    }

    /// Snapshot for front-ends.
    pub fn status(&self) -> PlayerStatus {
        let stats = self.speaker.stats();
        PlayerStatus {
            state: self.state,
            warning: self.warning,
            now_playing: self.now_playing.clone(),
            media_type: self
                .now_playing
                .as_ref()
                .and(self.media_file_type.label())
                .map(str::to_string),
            format: self.stream_info.map(Into::into),
            played_frames: stats.played_frames,
            underrun_frames: stats.underrun_frames,
            underrun_events: stats.underrun_events,
            buffered_bytes: stats.buffered_bytes,
        }
    }
}

impl<S: Speaker> Drop for MediaPlayer<S> {
    fn drop(&mut self) {
        self.teardown();
        self.speaker.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::testing::{ScriptedCodec, frame};
    use crate::net::HttpConnector;
    use crate::ring_buffer::Outcome;
    use crate::status::SpeakerStats;
    use crate::wav::encode_header;
    use std::time::{Duration, Instant};

    /// Speaker that records every write and plays out instantly when `drain` is set.
    #[derive(Default)]
    struct RecordingSpeaker {
        capacity: usize,
        queued: usize,
        drain: bool,
        written: Vec<u8>,
        requests: Vec<(usize, usize)>,
        formats: Vec<StreamInfo>,
        started: bool,
        pending_events: Vec<TaskEvent>,
        /// Non-zero bytes whose value differs from the current channel count.
        wrong_format_bytes: usize,
    }

    impl RecordingSpeaker {
        fn new(capacity: usize) -> Self {
            Self {
                capacity,
                drain: true,
                ..Self::default()
            }
        }
    }

    impl Speaker for RecordingSpeaker {
        fn write(&mut self, data: &[u8]) -> Outcome {
            let free = self.free_bytes();
            self.requests.push((data.len(), free));
            let n = data.len().min(free);
            if let Some(info) = self.formats.last() {
                self.wrong_format_bytes += data[..n]
                    .iter()
                    .filter(|&&b| b != 0 && u16::from(b) != info.channels)
                    .count();
            }
            self.written.extend_from_slice(&data[..n]);
            self.queued += n;
            Outcome {
                consumed: n,
                has_more: n < data.len(),
            }
        }

        fn free_bytes(&self) -> usize {
            self.capacity - self.queued
        }

        fn start(&mut self) -> Result<()> {
            self.started = true;
            Ok(())
        }

        fn stop(&mut self) {
            self.started = false;
            self.queued = 0;
        }

        fn has_buffered_data(&self) -> bool {
            if self.drain { false } else { self.queued > 0 }
        }

        fn set_stream_info(&mut self, info: StreamInfo) {
            if self.formats.last() != Some(&info) {
                self.formats.push(info);
                self.queued = 0;
            }
        }

        fn read_event(&mut self) -> Option<TaskEvent> {
            self.pending_events.pop()
        }

        fn stats(&self) -> SpeakerStats {
            SpeakerStats {
                buffered_bytes: Some(self.queued as u64),
                ..SpeakerStats::default()
            }
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            fetch_buffer_bytes: 256,
            decode_buffer_bytes: 256,
            decode_scratch_bytes: 128,
            transfer_bytes: 64,
            command_poll: Duration::from_millis(2),
            read_timeout: Duration::from_millis(2),
            ..PipelineConfig::default()
        }
    }

    fn player(speaker: RecordingSpeaker) -> MediaPlayer<RecordingSpeaker> {
        MediaPlayer::with_frame_decoder(
            speaker,
            test_config(),
            Arc::new(HttpConnector::default()),
            Arc::new(|| Box::new(ScriptedCodec::default())),
        )
    }

    /// Tick until `cond` holds, letting the recording speaker play out as it goes.
    fn tick_until(p: &mut MediaPlayer<RecordingSpeaker>, mut cond: impl FnMut(&MediaPlayer<RecordingSpeaker>) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond(&*p) {
            assert!(Instant::now() < deadline, "player stuck in {:?}", p.state());
            p.tick();
            if p.speaker().drain {
                p.speaker_mut().queued = 0;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn wav_bytes(pcm: &[u8]) -> Arc<[u8]> {
        let mut wav = encode_header(StreamInfo::new(2, 8_000, 16), pcm.len() as u32).to_vec();
        wav.extend_from_slice(pcm);
        wav.into()
    }

    #[test]
    fn wav_plays_to_completion_and_returns_to_idle() {
        let pcm: Vec<u8> = (0..2_000u32).map(|i| (i * 7 % 256) as u8).collect();
        let mut p = player(RecordingSpeaker::new(100));
        p.play_source(Source::LocalBytes(wav_bytes(&pcm)), None).unwrap();
        assert_eq!(p.state(), PlaybackState::Starting);

        let mut seen_playing = false;
        tick_until(&mut p, |p| {
            seen_playing |= p.state() == PlaybackState::Playing;
            p.state() == PlaybackState::Idle
        });

        assert!(seen_playing);
        assert_eq!(p.speaker().written, pcm);
        assert_eq!(p.speaker().formats, vec![StreamInfo::new(2, 8_000, 16)]);
        assert!(p.speaker().requests.iter().all(|&(want, free)| want <= free && want > 0));
        assert!(!p.speaker().started);
        assert!(p.status().now_playing.is_none());
    }

    #[test]
    fn pump_never_writes_to_a_full_speaker() {
        let pcm = vec![1u8; 600];
        let mut speaker = RecordingSpeaker::new(64);
        speaker.drain = false;
        let mut p = player(speaker);
        p.play_source(Source::LocalBytes(wav_bytes(&pcm)), Some(MediaFileType::Wav))
            .unwrap();

        tick_until(&mut p, |p| p.speaker().free_bytes() == 0);
        for _ in 0..20 {
            p.tick();
        }
        let requests = p.speaker().requests.clone();
        assert!(requests.iter().all(|&(want, free)| want <= free));
        assert_eq!(p.speaker().written.len(), 64);

        p.speaker_mut().drain = true;
        tick_until(&mut p, |p| p.state() == PlaybackState::Idle);
        assert_eq!(p.speaker().written, pcm);
    }

    #[test]
    fn mp3_stream_announces_format_and_plays() {
        let mut bytes = vec![0x13u8; 20];
        bytes.extend(frame(1, 16, &[1, 2, 3]));
        bytes.extend(frame(1, 16, &[4, 5]));
        let mut p = player(RecordingSpeaker::new(100));
        p.play_source(Source::LocalBytes(bytes.into()), Some(MediaFileType::Mp3))
            .unwrap();

        tick_until(&mut p, |p| p.state() == PlaybackState::Idle);
        let expected: Vec<u8> = [1i16, 2, 3, 4, 5].iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(p.speaker().written, expected);
        assert_eq!(p.speaker().formats, vec![StreamInfo::new(1, 16_000, 16)]);
        assert_eq!(p.stream_info(), Some(StreamInfo::new(1, 16_000, 16)));
    }

    #[test]
    fn format_changes_never_leak_pcm_across_the_boundary() {
        // Mono frames carry sample value 1, stereo frames value 2.
        let mut bytes = Vec::new();
        for group in 0..20 {
            for _ in 0..3 {
                if group % 2 == 0 {
                    bytes.extend(frame(1, 16, &[1; 8]));
                } else {
                    bytes.extend(frame(2, 48, &[2; 8]));
                }
            }
        }
        let mut p = player(RecordingSpeaker::new(100));
        p.play_source(Source::LocalBytes(bytes.into()), Some(MediaFileType::Mp3))
            .unwrap();
        tick_until(&mut p, |p| p.state() == PlaybackState::Idle);

        let speaker = p.speaker();
        assert_eq!(speaker.wrong_format_bytes, 0);
        assert_eq!(speaker.formats.last(), Some(&StreamInfo::new(2, 48_000, 16)));
        let last_group: Vec<u8> = [2i16; 24].iter().flat_map(|s| s.to_le_bytes()).collect();
        assert!(speaker.written.ends_with(&last_group));
    }

    #[test]
    fn stop_tears_down_without_draining() {
        let pcm = vec![9u8; 4_000];
        let mut speaker = RecordingSpeaker::new(64);
        speaker.drain = false;
        let mut p = player(speaker);
        p.play_source(Source::LocalBytes(wav_bytes(&pcm)), None).unwrap();
        tick_until(&mut p, |p| p.state() == PlaybackState::Playing);

        p.stop();
        assert_eq!(p.state(), PlaybackState::Stopping);
        tick_until(&mut p, |p| p.state() == PlaybackState::Idle);
        assert!(p.speaker().written.len() < pcm.len());
        assert!(!p.speaker().started);
    }

    #[test]
    fn pause_and_toggle() {
        let pcm = vec![2u8; 4_000];
        let mut speaker = RecordingSpeaker::new(64);
        speaker.drain = false;
        let mut p = player(speaker);
        p.play_source(Source::LocalBytes(wav_bytes(&pcm)), None).unwrap();
        tick_until(&mut p, |p| p.state() == PlaybackState::Playing);

        p.toggle();
        assert_eq!(p.state(), PlaybackState::Paused);
        for _ in 0..10 {
            p.tick();
        }
        assert_eq!(p.state(), PlaybackState::Paused);

        // `play` is a no-op unless paused.
        p.toggle();
        assert_eq!(p.state(), PlaybackState::Starting);
        p.speaker_mut().drain = true;
        tick_until(&mut p, |p| p.state() == PlaybackState::Playing);
        p.play();
        assert_eq!(p.state(), PlaybackState::Playing);

        tick_until(&mut p, |p| p.state() == PlaybackState::Idle);
        assert_eq!(p.speaker().written, pcm);
    }

    #[test]
    fn output_failure_stops_the_pipeline() {
        let pcm = vec![4u8; 4_000];
        let mut speaker = RecordingSpeaker::new(64);
        speaker.drain = false;
        let mut p = player(speaker);
        p.play_source(Source::LocalBytes(wav_bytes(&pcm)), None).unwrap();
        tick_until(&mut p, |p| p.state() == PlaybackState::Playing);

        p.speaker_mut()
            .pending_events
            .push(TaskEvent::warning(StageError::Output));
        p.tick();
        assert_eq!(p.state(), PlaybackState::Stopping);
        tick_until(&mut p, |p| p.state() == PlaybackState::Idle);
        assert!(p.has_warning());
    }

    #[test]
    fn unsupported_wav_ends_in_idle_with_warning() {
        let mut wav = encode_header(StreamInfo::new(3, 8_000, 16), 6).to_vec();
        wav.extend_from_slice(&[0u8; 6]);
        let mut p = player(RecordingSpeaker::new(64));
        p.play_source(Source::LocalBytes(wav.into()), None).unwrap();

        tick_until(&mut p, |p| p.state() == PlaybackState::Idle);
        assert!(p.has_warning());
        assert!(p.speaker().written.is_empty());
    }

    #[test]
    fn status_reports_source_and_format() {
        let pcm = vec![5u8; 4_000];
        let mut speaker = RecordingSpeaker::new(64);
        speaker.drain = false;
        let mut p = player(speaker);
        let idle = p.status();
        assert_eq!(idle.state, PlaybackState::Idle);
        assert!(idle.now_playing.is_none() && idle.media_type.is_none());
        assert_eq!(idle.buffered_bytes, Some(0));

        p.play_source(Source::LocalBytes(wav_bytes(&pcm)), None).unwrap();
        tick_until(&mut p, |p| p.stream_info().is_some() && p.state() == PlaybackState::Playing);
        let status = p.status();
        assert_eq!(status.now_playing.as_deref(), Some("<4044 local bytes>"));
        assert_eq!(status.media_type.as_deref(), Some("wav"));
        assert_eq!(status.state, PlaybackState::Playing);
        assert_eq!(status.format.map(|f| f.sample_rate), Some(8_000));
        assert!(status.buffered_bytes.is_some());
    }
}
