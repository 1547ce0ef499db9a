//! MP3 frame decoder backed by Symphonia's layer III decoder.
//!
//! Frames are located and sized with [`FrameHeader`], then handed to Symphonia one
//! packet at a time. The Symphonia decoder is rebuilt when the stream's sample rate or
//! channel count changes.

use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_MP3, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::formats::Packet;

use super::header::{self, FrameHeader};
use super::{DecodeError, DecodedFrame, FrameDecoder, FrameInfo};

#[derive(Default)]
pub struct Mp3FrameDecoder {
    decoder: Option<Box<dyn Decoder>>,
    /// `(sample_rate, channels)` the current decoder was built for.
    decoder_format: Option<(u32, u16)>,
    next_ts: u64,
    info: FrameInfo,
}

impl Mp3FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn decoder_for(&mut self, h: &FrameHeader) -> Result<&mut Box<dyn Decoder>, DecodeError> {
        let format = (h.sample_rate, h.channels());
        if self.decoder_format != Some(format) {
            let layout = if h.channels() == 1 {
                Channels::FRONT_LEFT
            } else {
                Channels::FRONT_LEFT | Channels::FRONT_RIGHT
            };
            let mut params = CodecParameters::new();
            params
                .for_codec(CODEC_TYPE_MP3)
                .with_sample_rate(h.sample_rate)
                .with_channels(layout);
            let decoder = symphonia::default::get_codecs()
                .make(&params, &DecoderOptions::default())
                .map_err(|e| {
                    tracing::warn!("mp3 decoder init failed: {e}");
                    DecodeError::Invalid {
                        skip: h.frame_len(),
                        reason: "decoder unavailable",
                    }
                })?;
            if self.decoder_format.is_some() {
                tracing::debug!(rate_hz = h.sample_rate, channels = h.channels(), "mp3 format changed");
            }
            self.decoder = Some(decoder);
            self.decoder_format = Some(format);
        }
        self.decoder.as_mut().ok_or(DecodeError::Invalid {
            skip: 1,
            reason: "decoder unavailable",
        })
    }
}

fn is_layer3(h: &FrameHeader) -> bool {
    h.layer == 3
}

impl FrameDecoder for Mp3FrameDecoder {
    fn find_sync_word(&self, window: &[u8]) -> Option<usize> {
        header::find_sync(window, is_layer3)
    }

    fn decode_frame(&mut self, window: &[u8], pcm: &mut [i16]) -> Result<DecodedFrame, DecodeError> {
        if window.len() < header::HEADER_LEN {
            return Err(DecodeError::InDataUnderflow);
        }
        let h = FrameHeader::parse(window)
            .filter(is_layer3)
            .ok_or(DecodeError::Invalid {
                skip: 1,
                reason: "bad frame header",
            })?;
        let len = h.frame_len();
        if window.len() < len {
            return Err(DecodeError::InDataUnderflow);
        }

        let ts = self.next_ts;
        let dur = h.samples_per_frame() as u64;
        let packet = Packet::new_from_slice(0, ts, dur, &window[..len]);
        let decoder = self.decoder_for(&h)?;

        let decoded = decoder.decode(&packet).map_err(|e| {
            tracing::trace!("mp3 frame rejected: {e}");
            DecodeError::Invalid {
                skip: len,
                reason: "corrupt frame",
            }
        })?;

        if decoded.frames() == 0 {
            self.next_ts += dur;
            return Err(DecodeError::MainDataUnderflow { consumed: len });
        }

        let mut sample_buf = SampleBuffer::<i16>::new(decoded.frames() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        let samples = sample_buf.samples();
        if samples.len() > pcm.len() {
            return Err(DecodeError::Invalid {
                skip: len,
                reason: "frame larger than pcm buffer",
            });
        }
        pcm[..samples.len()].copy_from_slice(samples);

        self.next_ts += dur;
        self.info = FrameInfo {
            bitrate: h.bitrate_kbps * 1000,
            channels: h.channels(),
            sample_rate: h.sample_rate,
            bits_per_sample: 16,
            output_samples: samples.len(),
            layer: h.layer,
            version: h.version,
        };
        Ok(DecodedFrame {
            consumed: len,
            samples: samples.len(),
        })
    }

    fn last_frame_info(&self) -> FrameInfo {
        self.info
    }
}
