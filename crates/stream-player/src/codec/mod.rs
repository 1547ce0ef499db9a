//! Frame-at-a-time MP3 codec interface used by the decode stage.
//!
//! The decode stage owns the byte window and the sync search loop; a [`FrameDecoder`]
//! only ever sees a slice starting at a candidate frame.

pub mod header;
mod mp3;

pub use mp3::Mp3FrameDecoder;

/// Properties of the most recently decoded frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Bits per second.
    pub bitrate: u32,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Interleaved samples written to the PCM buffer (frames * channels).
    pub output_samples: usize,
    pub layer: u8,
    pub version: header::MpegVersion,
}

/// Successful decode of one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Input bytes used by the frame.
    pub consumed: usize,
    /// Interleaved samples written to the PCM buffer.
    pub samples: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The window ends before the frame does; retry with more input.
    #[error("frame extends past the input window")]
    InDataUnderflow,
    /// The frame was consumed but produced no audio yet (bit reservoir still filling).
    #[error("main data underflow")]
    MainDataUnderflow { consumed: usize },
    /// Corrupt or unsupported frame; skip `skip` bytes and resync.
    #[error("invalid frame: {reason}")]
    Invalid { skip: usize, reason: &'static str },
}

pub trait FrameDecoder: Send {
    /// Offset of the first plausible frame header in `window`.
    fn find_sync_word(&self, window: &[u8]) -> Option<usize>;

    /// Decode the frame at the start of `window` into interleaved 16-bit `pcm`.
    fn decode_frame(&mut self, window: &[u8], pcm: &mut [i16]) -> Result<DecodedFrame, DecodeError>;

    fn last_frame_info(&self) -> FrameInfo;
}
