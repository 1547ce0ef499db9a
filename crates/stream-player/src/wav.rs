//! WAV header pre-flight reader.
//!
//! Validates the RIFF header of a stream before any of it reaches the decode or
//! playback stages. Only 16-bit PCM, mono or stereo, is accepted. Chunks other than
//! `fmt ` and `data` are skipped by their declared length.

use crate::events::{StageError, StreamInfo};
use crate::net::Connection;

/// Length of the canonical header: RIFF + fmt (16) + data chunk header.
pub const CANONICAL_HEADER_LEN: usize = 44;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WavError {
    #[error("header truncated")]
    Truncated,
    #[error("file has no RIFF tag")]
    MissingRiff,
    #[error("format tag is not WAVE")]
    MissingWave,
    #[error("no fmt chunk before data")]
    MissingFmt,
    #[error("fmt chunk is {0} bytes, expected 16")]
    FmtSize(u32),
    #[error("format code {0} is not PCM")]
    NotPcm(u16),
    #[error("can only play mono or stereo audio, got {0} channels")]
    Channels(u16),
    #[error("can only play 16 bits per sample, got {0}")]
    BitDepth(u16),
    #[error("sample rate must be non-zero")]
    SampleRate,
    #[error("block align {0} does not match the channel count")]
    BlockAlign(u16),
    #[error("no data chunk")]
    MissingData,
}

/// Fields of a validated WAV header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavHeader {
    pub riff_size: u32,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Declared size of the `data` chunk.
    pub data_len: u32,
    /// Offset of the first PCM byte.
    pub header_len: usize,
}

struct Fmt {
    channels: u16,
    sample_rate: u32,
    byte_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

impl WavHeader {
    /// Validate a header from the first bytes of a stream.
    ///
    /// Returns [`WavError::Truncated`] when `bytes` ends before the `data` chunk header;
    /// the caller may retry with more bytes. Any other error is final.
    pub fn parse(bytes: &[u8]) -> Result<Self, WavError> {
        let mut fields = Fields { bytes, pos: 0 };

        if &fields.tag()? != b"RIFF" {
            return Err(WavError::MissingRiff);
        }
        let riff_size = fields.u32()?;
        if &fields.tag()? != b"WAVE" {
            return Err(WavError::MissingWave);
        }

        let mut fmt: Option<Fmt> = None;
        loop {
            let id = fields.tag()?;
            let size = fields.u32()?;
            match &id {
                b"fmt " => {
                    if size != 16 {
                        return Err(WavError::FmtSize(size));
                    }
                    fmt = Some(fields.fmt()?);
                }
                b"data" => {
                    let fmt = fmt.ok_or(WavError::MissingFmt)?;
                    return Ok(Self {
                        riff_size,
                        channels: fmt.channels,
                        sample_rate: fmt.sample_rate,
                        byte_rate: fmt.byte_rate,
                        block_align: fmt.block_align,
                        bits_per_sample: fmt.bits_per_sample,
                        data_len: size,
                        header_len: fields.pos,
                    });
                }
                other => {
                    tracing::debug!(
                        chunk = %String::from_utf8_lossy(other),
                        size,
                        "skipping wav chunk"
                    );
                    let padded = size as usize + (size as usize & 1);
                    fields.skip(padded)?;
                }
            }
        }
    }

    /// Validate a header when `bytes` is everything there is (a file, or a stream
    /// that ended): running out of input means the `data` chunk is missing.
    pub fn parse_complete(bytes: &[u8]) -> Result<Self, WavError> {
        match Self::parse(bytes) {
            Err(WavError::Truncated) => Err(WavError::MissingData),
            other => other,
        }
    }

    pub fn stream_info(&self) -> StreamInfo {
        StreamInfo::new(self.channels, self.sample_rate, self.bits_per_sample)
    }
}

/// Read from `conn` until a complete header has been seen, at most `limit` bytes.
///
/// Returns the header and every byte read so far (header included); the caller decides
/// whether to forward or strip it. Fails with `UnsupportedFormat` for a header that
/// must be refused and `Network` when the connection fails.
pub(crate) fn preflight(conn: &mut dyn Connection, limit: usize) -> Result<(WavHeader, Vec<u8>), StageError> {
    let mut head = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        match WavHeader::parse(&head) {
            Ok(header) => {
                tracing::debug!(
                    channels = header.channels,
                    rate_hz = header.sample_rate,
                    header_len = header.header_len,
                    "wav header ok"
                );
                return Ok((header, head));
            }
            Err(WavError::Truncated) if head.len() < limit => {}
            Err(e) => {
                tracing::warn!("rejecting wav stream: {e}");
                return Err(StageError::UnsupportedFormat);
            }
        }
        let want = chunk.len().min(limit - head.len());
        let n = conn.read(&mut chunk[..want]).map_err(|e| {
            tracing::warn!("wav header read failed: {e}");
            StageError::Network
        })?;
        if n == 0 {
            if conn.is_complete() {
                let err = WavHeader::parse_complete(&head).err().unwrap_or(WavError::MissingData);
                tracing::warn!("rejecting wav stream: {err}");
                return Err(StageError::UnsupportedFormat);
            }
            continue;
        }
        head.extend_from_slice(&chunk[..n]);
    }
}

/// Write a canonical 44-byte header for `data_len` bytes of PCM in `info`'s format.
pub fn encode_header(info: StreamInfo, data_len: u32) -> [u8; CANONICAL_HEADER_LEN] {
    let block_align = info.bytes_per_frame() as u16;
    let byte_rate = info.sample_rate * block_align as u32;
    let mut out = [0u8; CANONICAL_HEADER_LEN];
    out[0..4].copy_from_slice(b"RIFF");
    out[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    out[8..12].copy_from_slice(b"WAVE");
    out[12..16].copy_from_slice(b"fmt ");
    out[16..20].copy_from_slice(&16u32.to_le_bytes());
    out[20..22].copy_from_slice(&1u16.to_le_bytes());
    out[22..24].copy_from_slice(&info.channels.to_le_bytes());
    out[24..28].copy_from_slice(&info.sample_rate.to_le_bytes());
    out[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    out[32..34].copy_from_slice(&block_align.to_le_bytes());
    out[34..36].copy_from_slice(&info.bits_per_sample.to_le_bytes());
    out[36..40].copy_from_slice(b"data");
    out[40..44].copy_from_slice(&data_len.to_le_bytes());
    out
}

/// Sequential little-endian field cursor.
struct Fields<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Fields<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8], WavError> {
        let end = self.pos.checked_add(n).ok_or(WavError::Truncated)?;
        let out = self.bytes.get(self.pos..end).ok_or(WavError::Truncated)?;
        self.pos = end;
        Ok(out)
    }

    fn tag(&mut self) -> Result<[u8; 4], WavError> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    fn u32(&mut self) -> Result<u32, WavError> {
        self.tag().map(u32::from_le_bytes)
    }

    fn u16_pair(&mut self) -> Result<(u16, u16), WavError> {
        let b = self.tag()?;
        Ok((u16::from_le_bytes([b[0], b[1]]), u16::from_le_bytes([b[2], b[3]])))
    }

    fn skip(&mut self, n: usize) -> Result<(), WavError> {
        self.take(n).map(|_| ())
    }

    fn fmt(&mut self) -> Result<Fmt, WavError> {
        let (format_code, channels) = self.u16_pair()?;
        if format_code != 1 {
            return Err(WavError::NotPcm(format_code));
        }
        if channels == 0 || channels > 2 {
            return Err(WavError::Channels(channels));
        }
        let sample_rate = self.u32()?;
        if sample_rate == 0 {
            return Err(WavError::SampleRate);
        }
        let byte_rate = self.u32()?;
        let (block_align, bits_per_sample) = self.u16_pair()?;
        if bits_per_sample != 16 {
            return Err(WavError::BitDepth(bits_per_sample));
        }
        if block_align != channels * 2 {
            return Err(WavError::BlockAlign(block_align));
        }
        Ok(Fmt {
            channels,
            sample_rate,
            byte_rate,
            block_align,
            bits_per_sample,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(channels: u16, bits: u16) -> Vec<u8> {
        encode_header(StreamInfo::new(channels, 16_000, bits), 3_200).to_vec()
    }

    #[test]
    fn accepts_mono_and_stereo_16_bit() {
        for channels in [1u16, 2] {
            let parsed = WavHeader::parse(&header(channels, 16)).unwrap();
            assert_eq!(parsed.channels, channels);
            assert_eq!(parsed.sample_rate, 16_000);
            assert_eq!(parsed.bits_per_sample, 16);
            assert_eq!(parsed.byte_rate, 16_000 * 2 * channels as u32);
            assert_eq!(parsed.block_align, 2 * channels);
            assert_eq!(parsed.data_len, 3_200);
            assert_eq!(parsed.header_len, CANONICAL_HEADER_LEN);
        }
    }

    #[test]
    fn rejects_corrupted_tags() {
        let mut riff = header(1, 16);
        riff[1] = b'X';
        assert_eq!(WavHeader::parse(&riff), Err(WavError::MissingRiff));

        let mut wave = header(1, 16);
        wave[10] = b'X';
        assert_eq!(WavHeader::parse(&wave), Err(WavError::MissingWave));

        let mut fmt = header(1, 16);
        fmt[13] = b'X';
        assert_eq!(WavHeader::parse_complete(&fmt), Err(WavError::MissingFmt));

        let mut data = header(1, 16);
        data[38] = b'X';
        assert!(WavHeader::parse_complete(&data).is_err());
    }

    #[test]
    fn rejects_unsupported_formats() {
        assert_eq!(WavHeader::parse(&header(3, 16)), Err(WavError::Channels(3)));
        assert_eq!(WavHeader::parse(&header(0, 16)), Err(WavError::Channels(0)));
        assert_eq!(WavHeader::parse(&header(2, 24)), Err(WavError::BitDepth(24)));
        assert_eq!(WavHeader::parse(&header(2, 8)), Err(WavError::BitDepth(8)));

        let mut float = header(2, 16);
        float[20] = 3;
        assert_eq!(WavHeader::parse(&float), Err(WavError::NotPcm(3)));

        let mut no_rate = header(2, 16);
        no_rate[24..28].copy_from_slice(&0u32.to_le_bytes());
        assert_eq!(WavHeader::parse(&no_rate), Err(WavError::SampleRate));

        let mut misaligned = header(2, 16);
        misaligned[32..34].copy_from_slice(&2u16.to_le_bytes());
        assert_eq!(WavHeader::parse(&misaligned), Err(WavError::BlockAlign(2)));

        let mut extensible = header(2, 16);
        extensible[16] = 18;
        assert_eq!(WavHeader::parse(&extensible), Err(WavError::FmtSize(18)));
    }

    #[test]
    fn reports_truncation_until_data_chunk_is_seen() {
        let full = header(2, 16);
        for cut in [0, 3, 12, 20, 36, 43] {
            assert_eq!(WavHeader::parse(&full[..cut]), Err(WavError::Truncated), "cut at {cut}");
        }
        assert_eq!(WavHeader::parse_complete(&full[..40]), Err(WavError::MissingData));
    }

    #[test]
    fn preflight_returns_header_and_bytes_read() {
        use crate::net::LocalConnection;

        let mut bytes = header(2, 16);
        bytes.extend_from_slice(&[9u8; 100]);
        let mut conn = LocalConnection::new(bytes.clone().into());
        let (parsed, head) = preflight(&mut conn, 4096).unwrap();
        assert_eq!(parsed.channels, 2);
        assert!(head.len() >= CANONICAL_HEADER_LEN);
        assert_eq!(head, bytes[..head.len()]);

        let mut short = LocalConnection::new(bytes[..30].to_vec().into());
        assert_eq!(preflight(&mut short, 4096).unwrap_err(), StageError::UnsupportedFormat);

        let mut bad = LocalConnection::new(header(2, 8).into());
        assert_eq!(preflight(&mut bad, 4096).unwrap_err(), StageError::UnsupportedFormat);
    }

    #[test]
    fn preflight_gives_up_at_the_limit() {
        use crate::net::LocalConnection;

        let mut padded = header(1, 16)[..36].to_vec();
        padded.extend_from_slice(b"JUNK");
        padded.extend_from_slice(&1000u32.to_le_bytes());
        padded.extend_from_slice(&[0u8; 1000]);
        let mut conn = LocalConnection::new(padded.into());
        assert_eq!(preflight(&mut conn, 256).unwrap_err(), StageError::UnsupportedFormat);
    }

    #[test]
    fn skips_extra_chunks_before_data() {
        let full = header(1, 16);
        let mut with_list = full[..36].to_vec();
        with_list.extend_from_slice(b"LIST");
        with_list.extend_from_slice(&5u32.to_le_bytes());
        with_list.extend_from_slice(b"INFOx\0");
        with_list.extend_from_slice(&full[36..]);

        let parsed = WavHeader::parse(&with_list).unwrap();
        assert_eq!(parsed.header_len, CANONICAL_HEADER_LEN + 14);
        assert_eq!(parsed.stream_info(), StreamInfo::new(1, 16_000, 16));
    }
}
