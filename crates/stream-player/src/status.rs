use std::sync::atomic::Ordering;

use stream_player_types::PlayerStatus;

use crate::playback::OutputCounters;

/// Output-side counters reported by a [`Speaker`](crate::playback::Speaker).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpeakerStats {
    /// Frames handed to the device since the speaker last started.
    pub played_frames: Option<u64>,
    /// Frames emitted as silence because the input ring was empty.
    pub underrun_frames: Option<u64>,
    /// Callbacks that hit an empty input ring.
    pub underrun_events: Option<u64>,
    /// Bytes waiting in the speaker input ring.
    pub buffered_bytes: Option<u64>,
}

impl SpeakerStats {
    pub fn from_counters(counters: &OutputCounters, buffered_bytes: usize) -> Self {
        Self {
            played_frames: Some(counters.played_frames.load(Ordering::Relaxed)),
            underrun_frames: Some(counters.underrun_frames.load(Ordering::Relaxed)),
            underrun_events: Some(counters.underrun_events.load(Ordering::Relaxed)),
            buffered_bytes: Some(buffered_bytes as u64),
        }
    }
}

/// Milliseconds of audio played, when both the frame count and rate are known.
pub fn elapsed_ms(status: &PlayerStatus) -> Option<u64> {
    match (status.played_frames, status.format) {
        (Some(frames), Some(format)) if format.sample_rate > 0 => {
            Some(frames.saturating_mul(1000) / format.sample_rate as u64)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_player_types::StreamFormat;

    #[test]
    fn stats_read_live_counters() {
        let counters = OutputCounters::default();
        counters.played_frames.store(480, Ordering::Relaxed);
        counters.underrun_events.store(2, Ordering::Relaxed);
        let stats = SpeakerStats::from_counters(&counters, 64);
        assert_eq!(stats.played_frames, Some(480));
        assert_eq!(stats.underrun_frames, Some(0));
        assert_eq!(stats.underrun_events, Some(2));
        assert_eq!(stats.buffered_bytes, Some(64));
    }

    #[test]
    fn elapsed_needs_frames_and_rate() {
        let mut status = PlayerStatus {
            played_frames: Some(24_000),
            ..PlayerStatus::default()
        };
        assert_eq!(elapsed_ms(&status), None);
        status.format = Some(StreamFormat {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
        });
        assert_eq!(elapsed_ms(&status), Some(500));
    }
}
