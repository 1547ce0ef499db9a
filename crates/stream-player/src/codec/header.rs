//! MPEG audio frame header parsing.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MpegVersion {
    #[default]
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

/// Decoded 4-byte frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    /// 1, 2 or 3.
    pub layer: u8,
    pub crc_protected: bool,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub channel_mode: ChannelMode,
}

pub const HEADER_LEN: usize = 4;

const BITRATES_V1: [[u32; 15]; 3] = [
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
];

const BITRATES_V2: [[u32; 15]; 2] = [
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

impl FrameHeader {
    /// Parse the header at the start of `bytes`. Returns `None` for anything that is
    /// not a valid header (bad sync, reserved fields, free-format bitrate).
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let b = bytes.get(..HEADER_LEN)?;
        if b[0] != 0xFF || b[1] & 0xE0 != 0xE0 {
            return None;
        }

        let version = match (b[1] >> 3) & 0b11 {
            0b00 => MpegVersion::Mpeg25,
            0b10 => MpegVersion::Mpeg2,
            0b11 => MpegVersion::Mpeg1,
            _ => return None,
        };
        let layer = match (b[1] >> 1) & 0b11 {
            0b01 => 3,
            0b10 => 2,
            0b11 => 1,
            _ => return None,
        };
        let crc_protected = b[1] & 1 == 0;

        let bitrate_index = (b[2] >> 4) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return None;
        }
        let bitrate_kbps = match version {
            MpegVersion::Mpeg1 => BITRATES_V1[layer as usize - 1][bitrate_index],
            _ => BITRATES_V2[if layer == 1 { 0 } else { 1 }][bitrate_index],
        };

        let base_rate = match (b[2] >> 2) & 0b11 {
            0 => 44_100,
            1 => 48_000,
            2 => 32_000,
            _ => return None,
        };
        let sample_rate = match version {
            MpegVersion::Mpeg1 => base_rate,
            MpegVersion::Mpeg2 => base_rate / 2,
            MpegVersion::Mpeg25 => base_rate / 4,
        };

        let padding = (b[2] >> 1) & 1 == 1;
        let channel_mode = match b[3] >> 6 {
            0 => ChannelMode::Stereo,
            1 => ChannelMode::JointStereo,
            2 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        };

        Some(Self {
            version,
            layer,
            crc_protected,
            bitrate_kbps,
            sample_rate,
            padding,
            channel_mode,
        })
    }

    pub fn channels(&self) -> u16 {
        match self.channel_mode {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }

    /// PCM frames (per channel) carried by one MPEG frame.
    pub fn samples_per_frame(&self) -> usize {
        match (self.layer, self.version) {
            (1, _) => 384,
            (3, MpegVersion::Mpeg2 | MpegVersion::Mpeg25) => 576,
            _ => 1152,
        }
    }

    /// Total frame length in bytes, header included.
    pub fn frame_len(&self) -> usize {
        let bitrate = self.bitrate_kbps as usize * 1000;
        let rate = self.sample_rate as usize;
        let pad = self.padding as usize;
        match self.layer {
            1 => (12 * bitrate / rate + pad) * 4,
            _ => self.samples_per_frame() / 8 * bitrate / rate + pad,
        }
    }
}

/// Offset of the first byte position in `window` that parses as a frame header
/// accepted by `accept`.
pub fn find_sync(window: &[u8], accept: impl Fn(&FrameHeader) -> bool) -> Option<usize> {
    let last = window.len().checked_sub(HEADER_LEN)?;
    (0..=last).find(|&i| {
        window[i] == 0xFF && FrameHeader::parse(&window[i..]).is_some_and(|h| accept(&h))
    })
}
