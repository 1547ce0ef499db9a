//! Worker thread lifecycle and queue plumbing shared by the stages.
//!
//! Every stage runs its loop on one named thread. When the loop returns the stage is
//! terminal: the owner joins the thread and builds a fresh stage for the next stream.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender};

use crate::events::{EventType, MediaFileType, StageError, StreamInfo, TaskEvent};

/// Sending half of a stage's event queue.
///
/// `emit` blocks while the queue is full; a dropped receiver is ignored.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: Sender<TaskEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: Sender<TaskEvent>) -> Self {
        Self { tx }
    }

    pub(crate) fn emit(&self, event: TaskEvent) {
        let _ = self.tx.send(event);
    }

    /// Send without blocking; the event is dropped when the queue is full.
    pub(crate) fn offer(&self, event: TaskEvent) {
        let _ = self.tx.try_send(event);
    }

    pub(crate) fn kind(&self, kind: EventType) {
        self.emit(TaskEvent::new(kind));
    }

    pub(crate) fn started(&self, info: Option<StreamInfo>, media_file_type: Option<MediaFileType>) {
        self.emit(TaskEvent::started(info, media_file_type));
    }

    pub(crate) fn warning(&self, error: StageError) {
        self.emit(TaskEvent::warning(error));
    }
}

/// Bounded command + event queue pair for one stage.
pub(crate) struct Queues<C> {
    pub(crate) command_tx: Sender<C>,
    pub(crate) command_rx: Receiver<C>,
    pub(crate) event_tx: Sender<TaskEvent>,
    pub(crate) event_rx: Receiver<TaskEvent>,
}

impl<C> Queues<C> {
    pub(crate) fn bounded(depth: usize) -> Self {
        let (command_tx, command_rx) = crossbeam_channel::bounded(depth);
        let (event_tx, event_rx) = crossbeam_channel::bounded(depth);
        Self {
            command_tx,
            command_rx,
            event_tx,
            event_rx,
        }
    }
}

/// Handle to a stage worker thread.
pub(crate) struct StageTask {
    name: &'static str,
    join: Option<JoinHandle<()>>,
    spawned: bool,
}

impl StageTask {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            join: None,
            spawned: false,
        }
    }

    /// Spawn the worker once. Calling again while it runs is a no-op; calling after it
    /// has finished is an error because a terminal stage must be rebuilt.
    pub(crate) fn spawn<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.spawned {
            if self.is_running() {
                return Ok(());
            }
            return Err(anyhow!("{} stage has terminated; create a new one", self.name));
        }
        let join = thread::Builder::new()
            .name(format!("{}-stage", self.name))
            .spawn(body)
            .with_context(|| format!("spawn {} stage", self.name))?;
        self.join = Some(join);
        self.spawned = true;
        Ok(())
    }

    pub(crate) fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }

    /// `true` once the worker was started and has returned.
    pub(crate) fn is_terminated(&self) -> bool {
        self.spawned && !self.is_running()
    }

    /// Wait for the worker to exit, draining `events` so a worker blocked on a full
    /// queue can make progress. The caller must already have asked the worker to stop.
    pub(crate) fn shutdown(&mut self, events: &Receiver<TaskEvent>) {
        let Some(join) = self.join.take() else {
            return;
        };
        while !join.is_finished() {
            while events.try_recv().is_ok() {}
            thread::sleep(Duration::from_millis(2));
        }
        if join.join().is_err() {
            tracing::warn!(stage = self.name, "stage worker panicked");
        }
    }
}

/// Allocate a zeroed scratch buffer, or `None` when the allocator refuses.
pub(crate) fn try_alloc<T: Copy + Default>(len: usize) -> Option<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).ok()?;
    buf.resize(len, T::default());
    Some(buf)
}
