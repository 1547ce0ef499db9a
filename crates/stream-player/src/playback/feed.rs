//! Feed task: plays a WAV file or URL straight into the playback ring.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::config::PipelineConfig;
use crate::events::{EventType, MediaFileType, StageError, TaskEvent};
use crate::net::{Connection, Connector, LocalConnection};
use crate::task::{EventSink, try_alloc};
use crate::wav;

use super::{PlayerCommand, Shared};

#[derive(Clone, Debug)]
pub enum FeedCommand {
    /// A complete WAV file held in memory.
    File(Arc<[u8]>),
    /// A WAV stream behind a URI.
    Url(String),
    Stop,
}

pub(super) struct FeedTask {
    pub(super) shared: Arc<Shared>,
    pub(super) commands: Receiver<FeedCommand>,
    pub(super) events: EventSink,
    pub(super) player: Sender<PlayerCommand>,
    pub(super) connector: Arc<dyn Connector>,
    pub(super) config: PipelineConfig,
}

impl FeedTask {
    pub(super) fn run(self) {
        let mut next: Option<FeedCommand> = None;
        while !self.closing() {
            let command = match next.take() {
                Some(c) => c,
                None => match self.commands.recv_timeout(self.config.command_poll) {
                    Ok(c) => c,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
            };
            next = match command {
                FeedCommand::Stop => {
                    self.finish();
                    None
                }
                FeedCommand::File(bytes) => {
                    tracing::info!(bytes = bytes.len(), "playing wav file");
                    self.play(Box::new(LocalConnection::new(bytes)))
                }
                FeedCommand::Url(uri) => match self.connector.open(&uri) {
                    Ok(conn) => {
                        tracing::info!(%uri, "playing wav url");
                        self.play(conn)
                    }
                    Err(e) => {
                        tracing::warn!(%uri, "failed to open wav url: {e:#}");
                        self.events.offer(TaskEvent::warning(StageError::Network));
                        self.finish();
                        None
                    }
                },
            };
        }
    }

    fn closing(&self) -> bool {
        self.shared.closing.load(Ordering::Acquire)
    }

    /// Stream one WAV into the ring. Returns the command that interrupted it, if any.
    fn play(&self, mut conn: Box<dyn Connection>) -> Option<FeedCommand> {
        let (header, head) = match wav::preflight(conn.as_mut(), self.config.wav_header_limit) {
            Ok(found) => found,
            Err(e) => {
                self.events.offer(TaskEvent::warning(e));
                self.finish();
                return None;
            }
        };
        let Some(mut chunk) = try_alloc::<u8>(self.config.transfer_bytes.max(1)) else {
            self.events.offer(TaskEvent::warning(StageError::OutOfMemory));
            self.finish();
            return None;
        };

        let info = header.stream_info();
        self.shared.set_stream_info(info, &self.player);
        self.events.offer(TaskEvent::started(Some(info), Some(MediaFileType::Wav)));

        // Streamed WAVs often declare 0 or u32::MAX bytes of data.
        let mut remaining = match header.data_len {
            0 | u32::MAX => usize::MAX,
            n => n as usize,
        };
        let mut pending = head[header.header_len.min(head.len())..].to_vec();
        pending.truncate(remaining);
        remaining -= pending.len();
        let mut pos = 0usize;

        while !self.closing() {
            match self.commands.try_recv() {
                Ok(command) => return Some(command),
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            let input = &self.shared.input;
            let mut moved = 0;
            if pos < pending.len() {
                moved = input.write(&pending[pos..]).consumed;
                pos += moved;
            } else if remaining == 0 || conn.is_complete() {
                break;
            } else {
                let want = chunk.len().min(input.free()).min(remaining);
                if want > 0 {
                    match conn.read(&mut chunk[..want]) {
                        Ok(n) => {
                            // `want` never exceeds the free space, so this write takes all of it.
                            moved = input.write(&chunk[..n]).consumed;
                            remaining -= n;
                        }
                        Err(e) => {
                            tracing::warn!("wav feed read failed: {e}");
                            self.events.offer(TaskEvent::warning(StageError::Network));
                            break;
                        }
                    }
                }
            }

            if moved == 0 {
                // Ring full or nothing arrived; wait, but stay responsive to commands.
                match self.commands.recv_timeout(self.config.read_timeout) {
                    Ok(command) => return Some(command),
                    Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }
        }

        tracing::debug!("wav feed finished");
        self.finish();
        None
    }

    fn finish(&self) {
        if self.commands.is_empty() {
            self.shared.feeding.store(false, Ordering::Release);
        }
        self.events.offer(TaskEvent::new(EventType::Idle));
    }
}
