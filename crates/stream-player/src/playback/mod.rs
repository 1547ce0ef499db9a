//! Playback stage: PCM in, hardware out.
//!
//! PCM written through the [`Speaker`] interface lands in the stage's input ring. Two
//! sub-tasks run behind it:
//! - the player task owns the [`AudioOutput`] and (re)opens it on start and on format
//!   changes; the output's callback drains the ring
//! - the feed task plays a WAV file or URL straight into the ring

mod feed;
mod output;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::config::PipelineConfig;
use crate::events::{EventType, StageError, StreamInfo, TaskEvent};
use crate::net::Connector;
use crate::ring_buffer::{Outcome, RingBuffer};
use crate::status::SpeakerStats;
use crate::task::{EventSink, Queues, StageTask};

pub use feed::FeedCommand;
pub use output::{AudioOutput, CpalOutput, OutputCounters, OutputFactory};

/// PCM sink driven by the controller.
pub trait Speaker {
    /// Queue PCM without blocking; accepts at most `free_bytes()`.
    fn write(&mut self, data: &[u8]) -> Outcome;

    fn free_bytes(&self) -> usize;

    fn start(&mut self) -> Result<()>;

    /// Stop output and drop anything still queued.
    fn stop(&mut self);

    fn has_buffered_data(&self) -> bool;

    /// Reconfigure for a new PCM format. Queued data in the old format is dropped.
    fn set_stream_info(&mut self, info: StreamInfo);

    /// Next status event from the speaker's own tasks, if any.
    fn read_event(&mut self) -> Option<TaskEvent> {
        None
    }

    fn stats(&self) -> SpeakerStats {
        SpeakerStats::default()
    }
}

enum PlayerCommand {
    Open(StreamInfo),
    Close,
}

/// State shared between the stage handle and its sub-tasks.
struct Shared {
    input: Arc<RingBuffer>,
    stream_info: Mutex<Option<StreamInfo>>,
    counters: Arc<OutputCounters>,
    /// Set once the player should be producing sound.
    started: AtomicBool,
    feeding: AtomicBool,
    closing: AtomicBool,
}

pub struct PlaybackStage {
    shared: Arc<Shared>,
    player_tx: Sender<PlayerCommand>,
    player_rx: Receiver<PlayerCommand>,
    feed: Queues<FeedCommand>,
    player: StageTask,
    feeder: StageTask,
    output_factory: OutputFactory,
    connector: Arc<dyn Connector>,
    config: PipelineConfig,
}

impl PlaybackStage {
    pub fn new(config: &PipelineConfig, output_factory: OutputFactory, connector: Arc<dyn Connector>) -> Result<Self> {
        let input = RingBuffer::try_new(config.playback_buffer_bytes).context("allocate playback ring")?;
        let (player_tx, player_rx) = crossbeam_channel::bounded(config.queue_depth);
        Ok(Self {
            shared: Arc::new(Shared {
                input: Arc::new(input),
                stream_info: Mutex::new(None),
                counters: Arc::new(OutputCounters::default()),
                started: AtomicBool::new(false),
                feeding: AtomicBool::new(false),
                closing: AtomicBool::new(false),
            }),
            player_tx,
            player_rx,
            feed: Queues::bounded(config.queue_depth),
            player: StageTask::new("player"),
            feeder: StageTask::new("feed"),
            output_factory,
            connector,
            config: config.clone(),
        })
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        *self.shared.stream_info.lock().unwrap()
    }

    /// `true` while the feed task is playing a file or URL.
    pub fn is_feeding(&self) -> bool {
        self.shared.feeding.load(Ordering::Acquire)
    }

    /// Play a WAV file held in memory through the feed task.
    pub fn play_file(&mut self, bytes: Arc<[u8]>) -> Result<()> {
        self.send_feed(FeedCommand::File(bytes))
    }

    /// Stream a WAV URL through the feed task.
    pub fn play_url(&mut self, uri: impl Into<String>) -> Result<()> {
        self.send_feed(FeedCommand::Url(uri.into()))
    }

    pub fn stop_feed(&mut self) {
        if self.is_feeding() {
            let _ = self.feed.command_tx.try_send(FeedCommand::Stop);
        }
    }

    fn send_feed(&mut self, command: FeedCommand) -> Result<()> {
        self.start()?;
        self.shared.feeding.store(true, Ordering::Release);
        self.feed
            .command_tx
            .send(command)
            .context("feed task is gone")
    }

    fn spawn_tasks(&mut self) -> Result<()> {
        if !self.player.is_running() {
            if self.player.is_terminated() {
                self.player = StageTask::new("player");
            }
            let player = PlayerTask {
                shared: self.shared.clone(),
                commands: self.player_rx.clone(),
                events: EventSink::new(self.feed.event_tx.clone()),
                factory: self.output_factory.clone(),
                poll: self.config.command_poll,
            };
            self.player.spawn(move || player.run())?;
        }
        if !self.feeder.is_running() {
            if self.feeder.is_terminated() {
                self.feeder = StageTask::new("feed");
            }
            let feeder = feed::FeedTask {
                shared: self.shared.clone(),
                commands: self.feed.command_rx.clone(),
                events: EventSink::new(self.feed.event_tx.clone()),
                player: self.player_tx.clone(),
                connector: self.connector.clone(),
                config: self.config.clone(),
            };
            self.feeder.spawn(move || feeder.run())?;
        }
        Ok(())
    }

    /// Stop both sub-tasks and wait for them.
    pub fn shutdown(&mut self) {
        self.shared.closing.store(true, Ordering::Release);
        self.player.shutdown(&self.feed.event_rx);
        self.feeder.shutdown(&self.feed.event_rx);
        self.shared.closing.store(false, Ordering::Release);
    }
}

impl Speaker for PlaybackStage {
    fn write(&mut self, data: &[u8]) -> Outcome {
        self.shared.input.write(data)
    }

    fn free_bytes(&self) -> usize {
        self.shared.input.free()
    }

    fn start(&mut self) -> Result<()> {
        self.spawn_tasks()?;
        if !self.shared.started.swap(true, Ordering::AcqRel) {
            self.shared.counters.reset();
            if let Some(info) = self.stream_info() {
                send_player(&self.player_tx, PlayerCommand::Open(info));
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.stop_feed();
        if self.shared.started.swap(false, Ordering::AcqRel) {
            send_player(&self.player_tx, PlayerCommand::Close);
        }
        self.shared.input.reset();
    }

    fn has_buffered_data(&self) -> bool {
        self.shared.input.available() > 0
    }

    fn set_stream_info(&mut self, info: StreamInfo) {
        self.shared.set_stream_info(info, &self.player_tx);
    }

    fn read_event(&mut self) -> Option<TaskEvent> {
        self.feed.event_rx.try_recv().ok()
    }

    fn stats(&self) -> SpeakerStats {
        SpeakerStats::from_counters(&self.shared.counters, self.shared.input.available())
    }
}

impl Shared {
    /// Record a new format; on change drop queued PCM and reopen the output if playing.
    fn set_stream_info(&self, info: StreamInfo, player: &Sender<PlayerCommand>) {
        let mut current = self.stream_info.lock().unwrap();
        if *current == Some(info) {
            return;
        }
        tracing::debug!(
            channels = info.channels,
            rate_hz = info.sample_rate,
            bits = info.bits_per_sample,
            "playback format"
        );
        *current = Some(info);
        drop(current);
        self.input.reset();
        if self.started.load(Ordering::Acquire) {
            send_player(player, PlayerCommand::Open(info));
        }
    }
}

/// Non-blocking; the player exits early when no output device opens.
fn send_player(tx: &Sender<PlayerCommand>, command: PlayerCommand) {
    if tx.try_send(command).is_err() {
        tracing::warn!("player command dropped");
    }
}

impl Drop for PlaybackStage {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct PlayerTask {
    shared: Arc<Shared>,
    commands: Receiver<PlayerCommand>,
    events: EventSink,
    factory: OutputFactory,
    poll: Duration,
}

impl PlayerTask {
    fn run(self) {
        let mut output = match (self.factory)(self.shared.counters.clone()) {
            Ok(out) => out,
            Err(e) => {
                tracing::error!("audio output unavailable: {e:#}");
                self.events.offer(TaskEvent::warning(StageError::Output));
                self.events.offer(TaskEvent::new(EventType::Stopped));
                return;
            }
        };

        let mut open = false;
        while !self.shared.closing.load(Ordering::Acquire) {
            match self.commands.recv_timeout(self.poll) {
                Ok(PlayerCommand::Open(info)) => {
                    output.close();
                    match output.open(info, self.shared.input.clone()) {
                        Ok(()) => {
                            open = true;
                            self.events.offer(TaskEvent::started(Some(info), None));
                        }
                        Err(e) => {
                            open = false;
                            tracing::warn!("failed to open audio output: {e:#}");
                            self.events.offer(TaskEvent::warning(StageError::Output));
                        }
                    }
                }
                Ok(PlayerCommand::Close) => {
                    if open {
                        output.close();
                        open = false;
                        self.events.offer(TaskEvent::new(EventType::Idle));
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        output.close();
        self.events.offer(TaskEvent::new(EventType::Stopped));
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::thread::{self, JoinHandle};

    /// Output double that drains the ring on its own thread and keeps every byte.
    #[derive(Default, Clone)]
    pub(crate) struct Capture {
        pub(crate) opened: Arc<Mutex<Vec<StreamInfo>>>,
        pub(crate) bytes: Arc<Mutex<Vec<u8>>>,
    }

    impl Capture {
        pub(crate) fn factory(&self) -> OutputFactory {
            let capture = self.clone();
            Arc::new(move |_counters| {
                Ok(Box::new(CaptureOutput {
                    capture: capture.clone(),
                    stop: Arc::new(AtomicBool::new(false)),
                    drain: None,
                }) as Box<dyn AudioOutput>)
            })
        }
    }

    struct CaptureOutput {
        capture: Capture,
        stop: Arc<AtomicBool>,
        drain: Option<JoinHandle<()>>,
    }

    impl AudioOutput for CaptureOutput {
        fn open(&mut self, info: StreamInfo, source: Arc<RingBuffer>) -> Result<()> {
            self.capture.opened.lock().unwrap().push(info);
            self.stop = Arc::new(AtomicBool::new(false));
            let stop = self.stop.clone();
            let bytes = self.capture.bytes.clone();
            self.drain = Some(thread::spawn(move || {
                let mut buf = [0u8; 64];
                while !stop.load(Ordering::Acquire) {
                    let r = source.read(&mut buf, Duration::from_millis(2));
                    bytes.lock().unwrap().extend_from_slice(&buf[..r.consumed]);
                }
            }));
            Ok(())
        }

        fn close(&mut self) {
            self.stop.store(true, Ordering::Release);
            if let Some(h) = self.drain.take() {
                let _ = h.join();
            }
        }
    }
}
