use std::time::Duration;

use stream_player::config::PipelineConfig;
use stream_player::events::MediaFileType;

use crate::cli::{Args, FormatArg};

/// Settings shared by both playback commands.
#[derive(Clone, Debug)]
pub struct OutputConfig {
    pub device: Option<String>,
    pub pipeline: PipelineConfig,
    pub tick: Duration,
    pub status_json: bool,
}

#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub source: String,
    pub media_file_type: Option<MediaFileType>,
    pub output: OutputConfig,
}

#[derive(Clone, Debug)]
pub struct PlayWavConfig {
    pub source: String,
    pub output: OutputConfig,
}

impl OutputConfig {
    pub fn from_args(args: &Args) -> Self {
        let pipeline = match args.buffer_kib {
            Some(kib) => PipelineConfig::default().with_buffer_kib(kib),
            None => PipelineConfig::default(),
        };
        Self {
            device: normalize_device_name(args.device.clone()),
            pipeline,
            tick: Duration::from_millis(args.tick_ms.max(1)),
            status_json: args.status_json,
        }
    }
}

impl From<FormatArg> for MediaFileType {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Wav => MediaFileType::Wav,
            FormatArg::Mp3 => MediaFileType::Mp3,
        }
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn blank_device_means_default() {
        assert_eq!(normalize_device_name(Some("  ".into())), None);
        assert_eq!(normalize_device_name(Some(" DAC ".into())), Some("DAC".into()));
        assert_eq!(normalize_device_name(None), None);
    }

    #[test]
    fn buffer_kib_resizes_the_rings() {
        let args = Args::try_parse_from(["streamer", "--buffer-kib", "8", "--tick-ms", "0", "list-devices"]).unwrap();
        let cfg = OutputConfig::from_args(&args);
        assert_eq!(cfg.pipeline.fetch_buffer_bytes, 8 * 1024);
        assert_eq!(cfg.tick, Duration::from_millis(1));
    }
}
