//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - choosing the stream config closest to a PCM format

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device whose name contains `needle` (case-insensitive), or the
/// host default device.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host.output_devices().context("No output devices")?.collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| matches_device_name(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose the supported output config closest to a PCM stream.
///
/// Prefers, in order: a rate at or below `target_rate`, the highest such rate, the
/// stream's channel count, then the sample format with the cheapest conversion.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
    channels: u16,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device.supported_output_configs()?.collect();

    let mut best: Option<(Rank, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let rank = Rank {
            below: rate <= target_rate,
            rate,
            channels_match: range.channels() == channels,
            format_rank: sample_format_rank(range.sample_format()),
        };
        let cfg = range.with_sample_rate(rate);
        if best.as_ref().is_none_or(|(b, _)| rank.is_better_than(b)) {
            best = Some((rank, cfg));
        }
    }

    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Pick a stream buffer size, preferring larger values to reduce underruns.
///
/// Returns `None` when the device only supports the default buffer size.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            const MAX_FRAMES: u32 = 8_192;
            let chosen = if *max > MAX_FRAMES {
                if *min > MAX_FRAMES { *min } else { MAX_FRAMES }
            } else {
                *max
            };
            Some(cpal::BufferSize::Fixed(chosen))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Output device metadata for `list-devices`.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub min_rate: u32,
    pub max_rate: u32,
    pub max_channels: u16,
}

pub fn list_devices(host: &cpal::Host) -> Result<Vec<DeviceInfo>> {
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok())
        .map(|d| d.name().to_string());

    let mut out = Vec::new();
    for d in host.output_devices().context("No output devices")? {
        let name = d.description()?.name().to_string();
        let mut min_rate = u32::MAX;
        let mut max_rate = 0u32;
        let mut max_channels = 0u16;
        if let Ok(ranges) = d.supported_output_configs() {
            for r in ranges {
                min_rate = min_rate.min(r.min_sample_rate());
                max_rate = max_rate.max(r.max_sample_rate());
                max_channels = max_channels.max(r.channels());
            }
        }
        if max_rate == 0 {
            tracing::debug!(device = %name, "skipping device without output configs");
            continue;
        }
        out.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            min_rate,
            max_rate,
            max_channels,
        });
    }
    Ok(out)
}

#[derive(Clone, Copy, Debug)]
struct Rank {
    below: bool,
    rate: u32,
    channels_match: bool,
    format_rank: u8,
}

impl Rank {
    fn is_better_than(&self, other: &Rank) -> bool {
        if self.below != other.below {
            self.below
        } else if self.rate != other.rate {
            // Below the target, higher is closer; above it, lower is closer.
            if self.below { self.rate > other.rate } else { self.rate < other.rate }
        } else if self.channels_match != other.channels_match {
            self.channels_match
        } else {
            self.format_rank < other.format_rank
        }
    }
}

fn pick_rate_for_range(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I16 => 0,
        cpal::SampleFormat::F32 => 1,
        cpal::SampleFormat::I32 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank(below: bool, rate: u32, channels_match: bool, format_rank: u8) -> Rank {
        Rank {
            below,
            rate,
            channels_match,
            format_rank,
        }
    }

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", "USB"));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", "  "));
    }

    #[test]
    fn pick_rate_for_range_clamps_to_range() {
        assert_eq!(pick_rate_for_range(8_000, 96_000, 44_100), 44_100);
        assert_eq!(pick_rate_for_range(44_100, 96_000, 16_000), 44_100);
        assert_eq!(pick_rate_for_range(8_000, 48_000, 192_000), 48_000);
    }

    #[test]
    fn exact_rate_beats_channel_match() {
        let exact = rank(true, 44_100, false, 0);
        let lower = rank(true, 32_000, true, 0);
        assert!(exact.is_better_than(&lower));
        assert!(!lower.is_better_than(&exact));
    }

    #[test]
    fn above_target_prefers_the_closest_rate() {
        let near = rank(false, 44_100, true, 0);
        let far = rank(false, 96_000, true, 0);
        assert!(near.is_better_than(&far));
        assert!(rank(true, 8_000, true, 5).is_better_than(&near));
    }

    #[test]
    fn ties_break_on_channels_then_format() {
        let stereo_f32 = rank(true, 48_000, true, 1);
        let mono_i16 = rank(true, 48_000, false, 0);
        assert!(stereo_f32.is_better_than(&mono_i16));
        assert!(rank(true, 48_000, true, 0).is_better_than(&stereo_f32));
    }
}
