use crate::events::{MediaFileType, StageError};
use crate::task::try_alloc;
use crate::wav::{WavError, WavHeader};

use super::{DecodeSession, Flow, StageIo};

/// Strips the RIFF header, then copies PCM through unchanged.
pub(crate) struct WavSession {
    buf: Vec<u8>,
    /// Bytes collected while looking for the `data` chunk; `None` once it was found.
    header: Option<Vec<u8>>,
    header_limit: usize,
    /// PCM read along with the header that has not reached the output ring yet.
    staged: Vec<u8>,
}

impl WavSession {
    pub(crate) fn new(scratch_bytes: usize, header_limit: usize) -> Result<Self, StageError> {
        let buf = try_alloc::<u8>(scratch_bytes.max(1)).ok_or(StageError::OutOfMemory)?;
        Ok(Self {
            buf,
            header: Some(Vec::new()),
            header_limit,
            staged: Vec::new(),
        })
    }

    fn collect_header(&mut self, io: &StageIo<'_>, mut header: Vec<u8>) -> Flow {
        let want = self.buf.len().min(self.header_limit.saturating_sub(header.len()).max(1));
        let r = io.input.read(&mut self.buf[..want], io.read_timeout);
        header.extend_from_slice(&self.buf[..r.consumed]);

        match WavHeader::parse(&header) {
            Ok(parsed) => {
                let info = parsed.stream_info();
                tracing::debug!(
                    channels = info.channels,
                    rate_hz = info.sample_rate,
                    header_len = parsed.header_len,
                    "wav stream"
                );
                io.announce(info, MediaFileType::Wav);
                self.staged = header.split_off(parsed.header_len);
                Flow::Continue
            }
            Err(WavError::Truncated) if header.len() < self.header_limit => {
                self.header = Some(header);
                Flow::Continue
            }
            Err(e) => {
                tracing::warn!("refusing wav stream: {e}");
                io.events.warning(StageError::UnsupportedFormat);
                Flow::Abort
            }
        }
    }
}

impl DecodeSession for WavSession {
    fn step(&mut self, io: &StageIo<'_>) -> Flow {
        if let Some(header) = self.header.take() {
            return self.collect_header(io, header);
        }

        if !self.staged.is_empty() {
            let out = io.output.write(&self.staged);
            self.staged.drain(..out.consumed);
            return Flow::Continue;
        }

        let room = io.output.free().min(self.buf.len());
        if room == 0 {
            return Flow::Continue;
        }
        let r = io.input.read(&mut self.buf[..room], io.read_timeout);
        if r.consumed > 0 {
            io.output.write(&self.buf[..r.consumed]);
        }
        Flow::Continue
    }

    fn has_pending(&self) -> bool {
        !self.staged.is_empty()
    }
}
