//! Fetch stage: pulls bytes from a source into its output ring.
//!
//! The worker opens the current [`Source`], reads at most as many bytes as the ring
//! has room for, and reports `Running`/`Idle` every cycle. It exits (terminal) on
//! `Stop`, at end of stream, or after too many consecutive read errors.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::config::PipelineConfig;
use crate::events::{EventType, MediaFileType, StageError, TaskEvent};
use crate::net::{Connection, Connector, LocalConnection};
use crate::ring_buffer::{Outcome, RingBuffer};
use crate::task::{EventSink, Queues, StageTask, try_alloc};
use crate::wav;

/// Where a stream's bytes come from.
#[derive(Clone)]
pub enum Source {
    LocalBytes(Arc<[u8]>),
    RemoteUri(String),
}

impl Source {
    /// Best guess of the container: URI extension for remote sources, magic bytes for
    /// local ones.
    pub fn media_file_type(&self) -> MediaFileType {
        match self {
            Source::LocalBytes(bytes) => MediaFileType::sniff(&bytes[..bytes.len().min(16)]),
            Source::RemoteUri(uri) => MediaFileType::from_uri(uri),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Source::LocalBytes(bytes) => format!("<{} local bytes>", bytes.len()),
            Source::RemoteUri(uri) => uri.clone(),
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

#[derive(Clone, Debug)]
pub enum FetchCommand {
    /// With a source: drop the current connection, reset the ring and open it.
    /// Without: resume the current source.
    Play {
        source: Option<Source>,
        media_file_type: MediaFileType,
    },
    Pause,
    Stop,
}

pub struct FetchStage {
    output: Arc<RingBuffer>,
    queues: Queues<FetchCommand>,
    task: StageTask,
    connector: Arc<dyn Connector>,
    config: PipelineConfig,
    /// Source switches sent but not yet applied by the worker.
    pending_switch: Arc<AtomicUsize>,
}

impl FetchStage {
    pub fn new(config: &PipelineConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let output = RingBuffer::try_new(config.fetch_buffer_bytes)
            .context("allocate fetch ring buffer")?;
        Ok(Self {
            output: Arc::new(output),
            queues: Queues::bounded(config.queue_depth),
            task: StageTask::new("fetch"),
            connector,
            config: config.clone(),
            pending_switch: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Spawn the worker. A no-op while it runs.
    pub fn start(&mut self) -> Result<()> {
        if self.task.is_running() {
            return Ok(());
        }
        let worker = FetchWorker {
            output: self.output.clone(),
            commands: self.queues.command_rx.clone(),
            events: EventSink::new(self.queues.event_tx.clone()),
            connector: self.connector.clone(),
            config: self.config.clone(),
            pending_switch: self.pending_switch.clone(),
        };
        self.task.spawn(move || worker.run())
    }

    /// Queue a command, blocking while the queue is full.
    pub fn send_command(&self, command: FetchCommand) {
        if matches!(command, FetchCommand::Play { source: Some(_), .. }) {
            self.pending_switch.fetch_add(1, Ordering::AcqRel);
        }
        if self.queues.command_tx.send(command).is_err() {
            tracing::warn!("fetch command queue closed");
        }
    }

    pub fn read_event(&self) -> Option<TaskEvent> {
        self.queues.event_rx.try_recv().ok()
    }

    /// Non-blocking read from the output ring. Returns nothing while a source switch
    /// is pending so stale bytes never leak into the next stream.
    pub fn read(&self, out: &mut [u8]) -> Outcome {
        if self.pending_switch.load(Ordering::Acquire) > 0 {
            return Outcome::default();
        }
        self.output.read(out, Duration::ZERO)
    }

    pub fn available(&self) -> usize {
        if self.pending_switch.load(Ordering::Acquire) > 0 {
            return 0;
        }
        self.output.available()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn is_terminated(&self) -> bool {
        self.task.is_terminated()
    }

    /// Ask the worker to stop and wait for it.
    pub fn shutdown(&mut self) {
        if self.task.is_running() {
            let _ = self.queues.command_tx.try_send(FetchCommand::Stop);
        }
        self.task.shutdown(&self.queues.event_rx);
    }
}

impl Drop for FetchStage {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct FetchWorker {
    output: Arc<RingBuffer>,
    commands: Receiver<FetchCommand>,
    events: EventSink,
    connector: Arc<dyn Connector>,
    config: PipelineConfig,
    pending_switch: Arc<AtomicUsize>,
}

/// Per-source state owned by the worker.
#[derive(Default)]
struct Session {
    source: Option<Source>,
    media_file_type: MediaFileType,
    conn: Option<Box<dyn Connection>>,
    /// Bytes read from the connection that did not fit in the ring yet.
    carry: Vec<u8>,
    feeding: bool,
    read_errors: u32,
}

enum Step {
    Continue,
    Finished,
}

impl FetchWorker {
    fn run(self) {
        let Some(mut scratch) = try_alloc::<u8>(self.output.capacity().max(1)) else {
            tracing::warn!("fetch stage could not allocate its read buffer");
            self.events.warning(StageError::OutOfMemory);
            self.events.kind(EventType::Stopped);
            return;
        };
        self.events.started(None, None);

        let mut session = Session::default();
        loop {
            match self.next_command(&session) {
                Some(FetchCommand::Play {
                    source: Some(source),
                    media_file_type,
                }) => {
                    session = Session::default();
                    self.output.reset();
                    self.pending_switch.fetch_sub(1, Ordering::AcqRel);
                    tracing::info!(source = %source.describe(), "fetch source set");
                    session.source = Some(source);
                    session.media_file_type = media_file_type;
                    session.feeding = true;
                    if let Step::Finished = self.open(&mut session) {
                        break;
                    }
                }
                Some(FetchCommand::Play { source: None, .. }) => {
                    session.feeding = true;
                    if session.conn.is_none() && session.source.is_some() {
                        if let Step::Finished = self.open(&mut session) {
                            break;
                        }
                    }
                }
                Some(FetchCommand::Pause) => session.feeding = false,
                Some(FetchCommand::Stop) => {
                    tracing::debug!("fetch stage stopping");
                    break;
                }
                None => {}
            }

            if session.feeding && session.conn.is_some() {
                if let Step::Finished = self.feed(&mut session, &mut scratch) {
                    break;
                }
                self.events.kind(EventType::Running);
            } else {
                self.events.kind(EventType::Idle);
            }
        }

        drop(session);
        self.events.kind(EventType::Stopped);
    }

    /// Poll for a command. Waits up to the poll interval unless bytes are flowing.
    fn next_command(&self, session: &Session) -> Option<FetchCommand> {
        let flowing = session.feeding && session.conn.is_some() && self.output.free() > 0;
        if flowing {
            match self.commands.try_recv() {
                Ok(cmd) => Some(cmd),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(FetchCommand::Stop),
            }
        } else {
            match self.commands.recv_timeout(self.config.command_poll) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => Some(FetchCommand::Stop),
            }
        }
    }

    fn open(&self, session: &mut Session) -> Step {
        let Some(source) = session.source.as_ref() else {
            return Step::Continue;
        };
        let mut conn: Box<dyn Connection> = match source {
            Source::LocalBytes(bytes) => Box::new(LocalConnection::new(bytes.clone())),
            Source::RemoteUri(uri) => match self.connector.open(uri) {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("failed to open stream: {e:#}");
                    self.events.warning(StageError::Network);
                    session.feeding = false;
                    return Step::Continue;
                }
            },
        };

        if session.media_file_type == MediaFileType::Wav {
            match wav::preflight(conn.as_mut(), self.config.wav_header_limit) {
                Ok((_, head)) => session.carry = head,
                Err(err) => {
                    self.events.warning(err);
                    return Step::Finished;
                }
            }
        }
        session.conn = Some(conn);
        Step::Continue
    }

    fn feed(&self, session: &mut Session, scratch: &mut [u8]) -> Step {
        if !session.carry.is_empty() {
            let out = self.output.write(&session.carry);
            session.carry.drain(..out.consumed);
            return Step::Continue;
        }

        let Some(conn) = session.conn.as_mut() else {
            return Step::Continue;
        };
        if conn.is_complete() {
            tracing::info!(source = ?session.source, "fetch reached end of stream");
            return Step::Finished;
        }

        let free = self.output.free().min(scratch.len());
        if free == 0 {
            return Step::Continue;
        }
        match conn.read(&mut scratch[..free]) {
            Ok(n) => {
                session.read_errors = 0;
                if n > 0 {
                    let out = self.output.write(&scratch[..n]);
                    if out.has_more {
                        session.carry.extend_from_slice(&scratch[out.consumed..n]);
                    }
                }
                Step::Continue
            }
            Err(e) => {
                session.read_errors += 1;
                tracing::warn!(attempt = session.read_errors, "stream read failed: {e}");
                self.events.warning(StageError::Network);
                if session.read_errors >= self.config.max_read_retries {
                    tracing::warn!("giving up on stream after repeated read errors");
                    Step::Finished
                } else {
                    Step::Continue
                }
            }
        }
    }
}
