//! Streaming MP3 decode loop.
//!
//! A fixed scratch window slides over the input: undecoded bytes are shifted to the
//! front, the rest is topped up from the input ring, and one frame is decoded per step.
//! Decoded PCM is staged and drained into the output ring before the next frame.

use crate::codec::{DecodeError, FrameDecoder};
use crate::events::{MediaFileType, StageError, StreamInfo};
use crate::task::try_alloc;

use super::{DecodeSession, Flow, StageIo};

/// Bytes kept from a full window with no sync word, in case a header straddles the edge.
const SYNC_CARRY: usize = 3;

pub(crate) struct Mp3Session {
    decoder: Box<dyn FrameDecoder>,
    window: Vec<u8>,
    /// Start of undecoded data in `window`.
    start: usize,
    /// End of valid data in `window`.
    end: usize,
    pcm: Vec<i16>,
    staged: Vec<u8>,
    staged_pos: usize,
    stream_info: Option<StreamInfo>,
    lost_sync: bool,
    /// The last step could not make progress without more input.
    starved: bool,
}

impl Mp3Session {
    pub(crate) fn new(decoder: Box<dyn FrameDecoder>, scratch_bytes: usize) -> Result<Self, StageError> {
        let window = try_alloc::<u8>(scratch_bytes.max(SYNC_CARRY + 1)).ok_or(StageError::OutOfMemory)?;
        let pcm = try_alloc::<i16>(scratch_bytes / 2).ok_or(StageError::OutOfMemory)?;
        let mut staged = Vec::new();
        staged
            .try_reserve_exact(scratch_bytes)
            .map_err(|_| StageError::OutOfMemory)?;
        Ok(Self {
            decoder,
            window,
            start: 0,
            end: 0,
            pcm,
            staged,
            staged_pos: 0,
            stream_info: None,
            lost_sync: false,
            starved: true,
        })
    }

    fn drain_staged(&mut self, io: &StageIo<'_>) {
        let out = io.output.write(&self.staged[self.staged_pos..]);
        self.staged_pos += out.consumed;
        if self.staged_pos == self.staged.len() {
            self.staged.clear();
            self.staged_pos = 0;
        }
    }

    fn top_up(&mut self, io: &StageIo<'_>) {
        if self.start > 0 {
            self.window.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        if self.end < self.window.len() {
            let timeout = if self.starved { io.read_timeout } else { Default::default() };
            let r = io.input.read(&mut self.window[self.end..], timeout);
            self.end += r.consumed;
            if r.consumed > 0 {
                self.starved = false;
            }
        }
    }

    fn on_frame(&mut self, io: &StageIo<'_>, samples: usize) {
        let info = self.decoder.last_frame_info();
        if samples == 0 {
            return;
        }
        let current = StreamInfo::new(info.channels, info.sample_rate, info.bits_per_sample);
        if self.stream_info != Some(current) {
            tracing::info!(
                channels = current.channels,
                rate_hz = current.sample_rate,
                bitrate = info.bitrate,
                "mp3 stream format"
            );
            io.announce(current, MediaFileType::Mp3);
            self.stream_info = Some(current);
        }
        self.staged.clear();
        self.staged_pos = 0;
        for s in &self.pcm[..samples] {
            self.staged.extend_from_slice(&s.to_le_bytes());
        }
    }
}

impl DecodeSession for Mp3Session {
    fn step(&mut self, io: &StageIo<'_>) -> Flow {
        if self.staged_pos < self.staged.len() {
            self.drain_staged(io);
            return Flow::Continue;
        }

        self.top_up(io);
        if self.start == self.end {
            self.starved = true;
            return Flow::Continue;
        }

        let Some(offset) = self.decoder.find_sync_word(&self.window[self.start..self.end]) else {
            if !self.lost_sync {
                tracing::debug!(bytes = self.end - self.start, "no mp3 sync word in window");
                io.events.warning(StageError::SyncWordNotFound);
                self.lost_sync = true;
            }
            if self.end - self.start == self.window.len() {
                self.start = self.end - SYNC_CARRY;
            }
            self.starved = true;
            return Flow::Continue;
        };
        self.lost_sync = false;
        self.start += offset;

        match self.decoder.decode_frame(&self.window[self.start..self.end], &mut self.pcm) {
            Ok(frame) => {
                self.start += frame.consumed;
                self.on_frame(io, frame.samples);
            }
            Err(DecodeError::InDataUnderflow) => {
                if self.start == 0 && self.end == self.window.len() {
                    // Frame larger than the window; it can never decode.
                    self.start += 1;
                } else {
                    self.starved = true;
                }
            }
            Err(DecodeError::MainDataUnderflow { consumed }) => {
                self.start += consumed.min(self.end - self.start);
            }
            Err(DecodeError::Invalid { skip, reason }) => {
                tracing::trace!(skip, reason, "skipping bad mp3 data");
                self.start += skip.clamp(1, self.end - self.start);
            }
        }
        Flow::Continue
    }

    fn has_pending(&self) -> bool {
        self.staged_pos < self.staged.len() || !self.starved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::testing::{ScriptedCodec, frame};
    use crate::events::{EventType, TaskEvent};
    use crate::ring_buffer::RingBuffer;
    use crate::task::EventSink;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Harness {
        input: RingBuffer,
        output: RingBuffer,
        events: EventSink,
        rx: crossbeam_channel::Receiver<TaskEvent>,
        unacked: Mutex<usize>,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, rx) = crossbeam_channel::unbounded();
            Self {
                input: RingBuffer::new(512),
                output: RingBuffer::new(512),
                events: EventSink::new(tx),
                rx,
                unacked: Mutex::new(0),
            }
        }

        fn io(&self) -> StageIo<'_> {
            StageIo {
                input: &self.input,
                output: &self.output,
                events: &self.events,
                read_timeout: Duration::ZERO,
                unacked_formats: &self.unacked,
            }
        }
    }

    fn session(scratch: usize) -> Mp3Session {
        Mp3Session::new(Box::new(ScriptedCodec::default()), scratch).unwrap()
    }

    #[test]
    fn full_window_of_garbage_keeps_only_the_tail() {
        let h = Harness::new();
        let mut s = session(16);
        h.input.write(&[0x22; 16]);
        s.step(&h.io());
        assert_eq!(s.end - s.start, SYNC_CARRY);

        // A frame arriving after the trim still decodes.
        h.input.write(&[0xFF]);
        h.input.write(&[0xF0, 1, 8, 1, 7, 0]);
        for _ in 0..4 {
            s.step(&h.io());
        }
        let mut out = [0u8; 4];
        assert_eq!(h.output.read(&mut out, Duration::ZERO).consumed, 2);
        assert_eq!(&out[..2], &7i16.to_le_bytes());

        let warnings = h.rx.try_iter().filter(|e| e.kind == EventType::Warning).count();
        assert_eq!(warnings, 1);
    }

    #[test]
    fn staged_output_drains_across_steps_when_output_is_tight() {
        let h = Harness::new();
        let mut s = session(128);
        let mut sink = [0u8; 512];

        h.input.write(&frame(1, 8, &[0]));
        s.step(&h.io());
        s.step(&h.io());
        h.output.read(&mut sink, Duration::ZERO);

        // Same format again, with room for only 10 bytes.
        h.output.write(&[0u8; 502]);
        let samples: Vec<i16> = (0..30).collect();
        let expected: Vec<u8> = samples.iter().flat_map(|v| v.to_le_bytes()).collect();
        h.input.write(&frame(1, 8, &samples));

        s.step(&h.io());
        assert!(s.has_pending());
        s.step(&h.io());
        assert!(s.has_pending());

        assert_eq!(h.output.read(&mut sink, Duration::ZERO).consumed, 512);
        assert_eq!(&sink[502..], &expected[..10]);

        for _ in 0..8 {
            s.step(&h.io());
        }
        assert!(!s.has_pending());
        let r = h.output.read(&mut sink, Duration::ZERO);
        assert_eq!(&sink[..r.consumed], &expected[10..]);

        let started = h.rx.try_iter().filter(|e| e.kind == EventType::Started).count();
        assert_eq!(started, 1);
    }
}
