use serde::{Deserialize, Serialize};

/// Externally visible state of the media player.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Nothing loaded, or the last stream finished.
    #[default]
    Idle,
    /// A source is loaded but bytes are not flowing.
    Paused,
    /// Bytes are flowing from the source to the speaker.
    Playing,
    /// A play request was issued and the stages are coming up.
    Starting,
    /// A stop request was issued and the stages are winding down.
    Stopping,
}

impl PlaybackState {
    /// `true` for the states where a source is attached to the pipeline.
    pub fn has_source(self) -> bool {
        matches!(self, Self::Paused | Self::Playing | Self::Starting)
    }
}

/// PCM format announced by the decoder for the current stream.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

/// Status snapshot published by the player controller.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStatus {
    /// Current playback state.
    pub state: PlaybackState,
    /// `true` while a stage has reported a warning that has not been cleared.
    pub warning: bool,
    /// Source currently loaded (URI or local label).
    pub now_playing: Option<String>,
    /// Container label of the current stream (`wav`, `mp3`).
    pub media_type: Option<String>,
    /// PCM format currently flowing to the speaker.
    pub format: Option<StreamFormat>,
    /// Frames handed to the output device since the stream started.
    pub played_frames: Option<u64>,
    /// Frames filled with silence because the input ring was empty.
    pub underrun_frames: Option<u64>,
    /// Number of callbacks that hit an empty input ring.
    pub underrun_events: Option<u64>,
    /// Bytes waiting in the speaker input ring.
    pub buffered_bytes: Option<u64>,
}
