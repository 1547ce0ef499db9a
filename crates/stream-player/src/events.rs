//! Status and control messages exchanged between the controller and the stages.

use stream_player_types::StreamFormat;

/// PCM format flowing through a ring buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl StreamInfo {
    pub fn new(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Self {
        Self {
            channels,
            sample_rate,
            bits_per_sample,
        }
    }

    /// Bytes in one interleaved frame (all channels of one sample instant).
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    pub fn bytes_per_second(&self) -> usize {
        self.bytes_per_frame() * self.sample_rate as usize
    }
}

impl From<StreamInfo> for StreamFormat {
    fn from(info: StreamInfo) -> Self {
        StreamFormat {
            channels: info.channels,
            sample_rate: info.sample_rate,
            bits_per_sample: info.bits_per_sample,
        }
    }
}

/// Container/codec of the bytes entering the decode stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MediaFileType {
    #[default]
    None,
    Wav,
    Mp3,
}

impl MediaFileType {
    /// Guess the type from the extension of a URI or path, ignoring any query string.
    pub fn from_uri(uri: &str) -> Self {
        let tail = uri.split(['?', '#']).next().unwrap_or(uri);
        let file = tail.rsplit(['/', '\\']).next().unwrap_or(tail);
        let Some((_, ext)) = file.rsplit_once('.') else {
            return Self::None;
        };
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Self::Wav,
            "mp3" | "mpga" => Self::Mp3,
            _ => Self::None,
        }
    }

    /// Guess the type from the first bytes of a stream.
    pub fn sniff(head: &[u8]) -> Self {
        if head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WAVE" {
            Self::Wav
        } else if head.starts_with(b"ID3") || (head.len() >= 2 && head[0] == 0xFF && head[1] & 0xE0 == 0xE0) {
            Self::Mp3
        } else {
            Self::None
        }
    }

    pub fn label(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Wav => Some("wav"),
            Self::Mp3 => Some("mp3"),
        }
    }
}

/// Coarse condition reported upward with a `Warning` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("no frame sync word in input")]
    SyncWordNotFound,
    #[error("unsupported stream format")]
    UnsupportedFormat,
    #[error("network error")]
    Network,
    #[error("audio output error")]
    Output,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Started,
    Running,
    Idle,
    Warning,
    Stopping,
    Stopped,
}

/// Status message sent from a stage to its owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskEvent {
    pub kind: EventType,
    pub stream_info: Option<StreamInfo>,
    pub media_file_type: Option<MediaFileType>,
    pub error: Option<StageError>,
}

impl TaskEvent {
    pub fn new(kind: EventType) -> Self {
        Self {
            kind,
            stream_info: None,
            media_file_type: None,
            error: None,
        }
    }

    pub fn started(stream_info: Option<StreamInfo>, media_file_type: Option<MediaFileType>) -> Self {
        Self {
            stream_info,
            media_file_type,
            ..Self::new(EventType::Started)
        }
    }

    pub fn warning(error: StageError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(EventType::Warning)
        }
    }
}

/// Control message sent from the controller to the decode stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandEvent {
    /// Reset all state and start decoding the given container.
    Start { media_file_type: MediaFileType },
    /// Break out of the decode loop immediately.
    Stop,
    /// Finish once both rings have drained.
    StopGracefully,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_info_byte_math() {
        let info = StreamInfo::new(2, 44_100, 16);
        assert_eq!(info.bytes_per_frame(), 4);
        assert_eq!(info.bytes_per_second(), 176_400);
    }

    #[test]
    fn stream_info_equality_covers_every_field() {
        let base = StreamInfo::new(2, 44_100, 16);
        assert_eq!(base, StreamInfo::new(2, 44_100, 16));
        assert_ne!(base, StreamInfo::new(1, 44_100, 16));
        assert_ne!(base, StreamInfo::new(2, 48_000, 16));
        assert_ne!(base, StreamInfo::new(2, 44_100, 24));
    }

    #[test]
    fn from_uri_reads_extension_and_ignores_query() {
        assert_eq!(MediaFileType::from_uri("http://host/a/track.MP3?token=1"), MediaFileType::Mp3);
        assert_eq!(MediaFileType::from_uri("/tmp/chime.wav"), MediaFileType::Wav);
        assert_eq!(MediaFileType::from_uri("http://host/stream"), MediaFileType::None);
        assert_eq!(MediaFileType::from_uri("http://host.example/live"), MediaFileType::None);
        assert_eq!(MediaFileType::from_uri("http://host/a.flac"), MediaFileType::None);
    }

    #[test]
    fn sniff_detects_riff_id3_and_sync() {
        assert_eq!(MediaFileType::sniff(b"RIFF\x24\x00\x00\x00WAVEfmt "), MediaFileType::Wav);
        assert_eq!(MediaFileType::sniff(b"ID3\x04\x00"), MediaFileType::Mp3);
        assert_eq!(MediaFileType::sniff(&[0xFF, 0xFB, 0x90, 0x64]), MediaFileType::Mp3);
        assert_eq!(MediaFileType::sniff(b"OggS"), MediaFileType::None);
        assert_eq!(MediaFileType::sniff(b""), MediaFileType::None);
    }

    #[test]
    fn warning_event_carries_error() {
        let ev = TaskEvent::warning(StageError::Network);
        assert_eq!(ev.kind, EventType::Warning);
        assert_eq!(ev.error, Some(StageError::Network));
        assert!(ev.stream_info.is_none());
    }
}
