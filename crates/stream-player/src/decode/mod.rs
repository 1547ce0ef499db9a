//! Decode stage: container bytes in, 16-bit interleaved PCM out.
//!
//! The worker owns one decode session per stream. `Start` resets both rings and
//! builds a fresh session for the requested [`MediaFileType`]; the session then reads
//! its input ring and writes PCM to the output ring, never more than the output has
//! room for.

mod mp3;
mod wav;

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::codec::{FrameDecoder, Mp3FrameDecoder};
use crate::config::PipelineConfig;
use crate::events::{CommandEvent, EventType, MediaFileType, StageError, StreamInfo, TaskEvent};
use crate::ring_buffer::{Outcome, RingBuffer};
use crate::task::{EventSink, Queues, StageTask};

use mp3::Mp3Session;
use wav::WavSession;

/// Builds the frame decoder for each MP3 session.
pub type FrameDecoderFactory = Arc<dyn Fn() -> Box<dyn FrameDecoder> + Send + Sync>;

/// What a session wants the worker to do after a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    /// The stream cannot be decoded; stop the stage.
    Abort,
}

/// Rings and event sink a session works against.
pub(crate) struct StageIo<'a> {
    pub(crate) input: &'a RingBuffer,
    pub(crate) output: &'a RingBuffer,
    pub(crate) events: &'a EventSink,
    pub(crate) read_timeout: Duration,
    /// `Started` events the owner has not acknowledged yet.
    pub(crate) unacked_formats: &'a Mutex<usize>,
}

impl StageIo<'_> {
    /// Switch the output ring to a new format and announce it. Output stays hidden
    /// from the owner until it acknowledges the `Started` event.
    pub(crate) fn announce(&self, info: StreamInfo, media_file_type: MediaFileType) {
        {
            let mut unacked = self.unacked_formats.lock().unwrap();
            *unacked += 1;
            self.output.reset();
        }
        self.events.started(Some(info), Some(media_file_type));
    }
}

/// Per-stream decoder state.
pub(crate) trait DecodeSession: Send {
    /// Move some bytes from the input ring towards the output ring.
    fn step(&mut self, io: &StageIo<'_>) -> Flow;

    /// `true` while the session still holds data that can reach the output ring
    /// without further input.
    fn has_pending(&self) -> bool;
}

pub struct DecodeStage {
    input: Arc<RingBuffer>,
    output: Arc<RingBuffer>,
    queues: Queues<CommandEvent>,
    task: StageTask,
    config: PipelineConfig,
    frame_decoder: FrameDecoderFactory,
    /// `Start` commands sent but not yet applied by the worker.
    pending_start: Arc<AtomicUsize>,
    /// Format announcements not yet acknowledged; output is held back while non-zero.
    unacked_formats: Arc<Mutex<usize>>,
}

impl DecodeStage {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Self::with_frame_decoder(config, Arc::new(|| Box::new(Mp3FrameDecoder::new())))
    }

    pub fn with_frame_decoder(config: &PipelineConfig, frame_decoder: FrameDecoderFactory) -> Result<Self> {
        let input = RingBuffer::try_new(config.decode_buffer_bytes).context("allocate decode input ring")?;
        let output = RingBuffer::try_new(config.decode_buffer_bytes).context("allocate decode output ring")?;
        Ok(Self {
            input: Arc::new(input),
            output: Arc::new(output),
            queues: Queues::bounded(config.queue_depth),
            task: StageTask::new("decode"),
            config: config.clone(),
            frame_decoder,
            pending_start: Arc::new(AtomicUsize::new(0)),
            unacked_formats: Arc::new(Mutex::new(0)),
        })
    }

    pub fn start(&mut self) -> Result<()> {
        if self.task.is_running() {
            return Ok(());
        }
        let worker = DecodeWorker {
            input: self.input.clone(),
            output: self.output.clone(),
            commands: self.queues.command_rx.clone(),
            events: EventSink::new(self.queues.event_tx.clone()),
            stale_events: self.queues.event_rx.clone(),
            config: self.config.clone(),
            frame_decoder: self.frame_decoder.clone(),
            pending_start: self.pending_start.clone(),
            unacked_formats: self.unacked_formats.clone(),
        };
        self.task.spawn(move || worker.run())
    }

    pub fn send_command(&self, command: CommandEvent) {
        if matches!(command, CommandEvent::Start { .. }) {
            self.pending_start.fetch_add(1, Ordering::AcqRel);
        }
        if self.queues.command_tx.send(command).is_err() {
            tracing::warn!("decode command queue closed");
        }
    }

    /// Next status event. Events still queued from before a pending `Start` describe
    /// the previous stream and are discarded.
    pub fn read_event(&self) -> Option<TaskEvent> {
        if self.gated() {
            while self.queues.event_rx.try_recv().is_ok() {}
            return None;
        }
        self.queues.event_rx.try_recv().ok()
    }

    fn gated(&self) -> bool {
        self.pending_start.load(Ordering::Acquire) > 0
    }

    /// Room in the input ring; zero while a `Start` is pending.
    pub fn free_input(&self) -> usize {
        if self.gated() { 0 } else { self.input.free() }
    }

    /// Feed container bytes. Accepts nothing while a `Start` is pending.
    pub fn write(&self, data: &[u8]) -> Outcome {
        if self.gated() {
            return Outcome {
                consumed: 0,
                has_more: !data.is_empty(),
            };
        }
        self.input.write(data)
    }

    /// Non-blocking read of decoded PCM. Yields nothing while a `Start` is pending or
    /// a `Started` event has not been acknowledged.
    pub fn read(&self, out: &mut [u8]) -> Outcome {
        if self.gated() {
            return Outcome::default();
        }
        let unacked = self.unacked_formats.lock().unwrap();
        if *unacked > 0 {
            return Outcome::default();
        }
        self.output.read(out, Duration::ZERO)
    }

    pub fn available(&self) -> usize {
        if self.gated() {
            return 0;
        }
        let unacked = self.unacked_formats.lock().unwrap();
        if *unacked > 0 { 0 } else { self.output.available() }
    }

    /// Release PCM held back by a `Started` event, once the consumer has switched to
    /// the announced format. Call once per `Started` received.
    pub fn acknowledge_format(&self) {
        let mut unacked = self.unacked_formats.lock().unwrap();
        *unacked = unacked.saturating_sub(1);
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn is_terminated(&self) -> bool {
        self.task.is_terminated()
    }

    pub fn shutdown(&mut self) {
        if self.task.is_running() {
            let _ = self.queues.command_tx.try_send(CommandEvent::Stop);
        }
        self.task.shutdown(&self.queues.event_rx);
    }
}

impl Drop for DecodeStage {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct DecodeWorker {
    input: Arc<RingBuffer>,
    output: Arc<RingBuffer>,
    commands: Receiver<CommandEvent>,
    events: EventSink,
    /// Receiving side of `events`, used to drop events from the previous stream.
    stale_events: Receiver<TaskEvent>,
    config: PipelineConfig,
    frame_decoder: FrameDecoderFactory,
    pending_start: Arc<AtomicUsize>,
    unacked_formats: Arc<Mutex<usize>>,
}

impl DecodeWorker {
    fn run(self) {
        let mut session: Option<Box<dyn DecodeSession>> = None;
        let mut stopping = false;

        loop {
            let command = if session.is_some() {
                match self.commands.try_recv() {
                    Ok(cmd) => Some(cmd),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => Some(CommandEvent::Stop),
                }
            } else {
                match self.commands.recv_timeout(self.config.command_poll) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => Some(CommandEvent::Stop),
                }
            };

            match command {
                Some(CommandEvent::Start { media_file_type }) => {
                    self.input.reset();
                    self.output.reset();
                    let built = self.new_session(media_file_type);
                    while self.stale_events.try_recv().is_ok() {}
                    *self.unacked_formats.lock().unwrap() = 0;
                    self.pending_start.fetch_sub(1, Ordering::AcqRel);
                    match built {
                        Ok(s) => {
                            tracing::debug!(media = ?media_file_type, "decode session started");
                            session = s;
                            stopping = false;
                        }
                        Err(err) => {
                            self.events.warning(err);
                            self.events.kind(EventType::Stopped);
                            return;
                        }
                    }
                }
                Some(CommandEvent::Stop) => break,
                Some(CommandEvent::StopGracefully) => stopping = true,
                None => {}
            }

            let io = StageIo {
                input: &self.input,
                output: &self.output,
                events: &self.events,
                read_timeout: self.config.read_timeout,
                unacked_formats: &self.unacked_formats,
            };
            if let Some(s) = session.as_mut() {
                if s.step(&io) == Flow::Abort {
                    break;
                }
            }

            let busy = self.input.available() > 0 || self.output.available() > 0;
            self.events.kind(if busy { EventType::Running } else { EventType::Idle });

            let pending = session.as_ref().is_some_and(|s| s.has_pending());
            if stopping && !busy && !pending {
                break;
            }
        }

        self.events.kind(EventType::Stopping);
        drop(session);
        self.input.reset();
        self.output.reset();
        self.events.kind(EventType::Stopped);
    }

    fn new_session(&self, media_file_type: MediaFileType) -> Result<Option<Box<dyn DecodeSession>>, StageError> {
        let scratch = self.config.decode_scratch_bytes;
        let session: Box<dyn DecodeSession> = match media_file_type {
            MediaFileType::Wav => Box::new(WavSession::new(scratch, self.config.wav_header_limit)?),
            MediaFileType::Mp3 => Box::new(Mp3Session::new((self.frame_decoder)(), scratch)?),
            MediaFileType::None => {
                tracing::warn!("decode started without a media type");
                return Ok(None);
            }
        };
        Ok(Some(session))
    }
}
