//! Hardware sink (CPAL output stream).
//!
//! The output callback:
//! - refills a small local buffer from the playback ring without blocking
//! - converts 16-bit little-endian PCM to `f32`
//! - applies basic channel mapping (mono↔stereo, best-effort otherwise)
//! - converts to the device sample format and counts underruns

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::device::{pick_buffer_size, pick_device, pick_output_config};
use crate::events::StreamInfo;
use crate::ring_buffer::RingBuffer;

/// Counters updated by the output callback.
#[derive(Debug, Default)]
pub struct OutputCounters {
    pub played_frames: AtomicU64,
    /// Frames emitted as silence because the ring was empty.
    pub underrun_frames: AtomicU64,
    pub underrun_events: AtomicU64,
}

impl OutputCounters {
    pub fn reset(&self) {
        self.played_frames.store(0, Ordering::Relaxed);
        self.underrun_frames.store(0, Ordering::Relaxed);
        self.underrun_events.store(0, Ordering::Relaxed);
    }
}

/// A device that plays PCM pulled from a ring buffer.
///
/// Implementations live on the playback player thread and need not be `Send`.
pub trait AudioOutput {
    /// (Re)open the device for `info` and start pulling from `source`.
    fn open(&mut self, info: StreamInfo, source: Arc<RingBuffer>) -> Result<()>;

    fn close(&mut self);
}

/// Builds the output on the player thread.
pub type OutputFactory = Arc<dyn Fn(Arc<OutputCounters>) -> Result<Box<dyn AudioOutput>> + Send + Sync>;

pub struct CpalOutput {
    device: cpal::Device,
    counters: Arc<OutputCounters>,
    stream: Option<cpal::Stream>,
}

impl CpalOutput {
    pub fn new(device_name: Option<&str>, counters: Arc<OutputCounters>) -> Result<Self> {
        let host = cpal::default_host();
        let device = pick_device(&host, device_name)?;
        if let Ok(desc) = device.description() {
            tracing::info!(device = %desc.name(), host = ?host.id(), "output device");
        }
        Ok(Self {
            device,
            counters,
            stream: None,
        })
    }

    pub fn factory(device_name: Option<String>) -> OutputFactory {
        Arc::new(move |counters| {
            let out = CpalOutput::new(device_name.as_deref(), counters)?;
            Ok(Box::new(out) as Box<dyn AudioOutput>)
        })
    }
}

impl AudioOutput for CpalOutput {
    fn open(&mut self, info: StreamInfo, source: Arc<RingBuffer>) -> Result<()> {
        self.close();
        if info.bits_per_sample != 16 {
            return Err(anyhow!("Unsupported bits per sample: {}", info.bits_per_sample));
        }

        let supported = pick_output_config(&self.device, info.sample_rate, info.channels)?;
        if supported.sample_rate() != info.sample_rate {
            tracing::warn!(
                stream_hz = info.sample_rate,
                device_hz = supported.sample_rate(),
                "device does not support the stream rate; playing at the nearest rate"
            );
        }
        let mut config: cpal::StreamConfig = supported.config();
        if let Some(size) = pick_buffer_size(&supported) {
            config.buffer_size = size;
        }
        tracing::info!(
            channels = config.channels,
            rate_hz = config.sample_rate,
            format = ?supported.sample_format(),
            "opening output stream"
        );

        let stream = build_output_stream(
            &self.device,
            &config,
            supported.sample_format(),
            source,
            info.channels as usize,
            self.counters.clone(),
        )?;
        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("output stream closed");
        }
    }
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    source: Arc<RingBuffer>,
    src_channels: usize,
    counters: Arc<OutputCounters>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, source, src_channels, counters),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, source, src_channels, counters),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, source, src_channels, counters),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, source, src_channels, counters),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Frames pulled from the ring per refill.
const REFILL_FRAMES: usize = 1024;

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    source: Arc<RingBuffer>,
    src_channels: usize,
    counters: Arc<OutputCounters>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let mut st = CallbackState::new(src_channels, REFILL_FRAMES);

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let frames = data.len() / channels_out;
            let mut filled = 0usize;

            for frame in 0..frames {
                if st.pos >= st.src.len() && !st.refill(&source) {
                    counters.underrun_events.fetch_add(1, Ordering::Relaxed);
                    counters
                        .underrun_frames
                        .fetch_add((frames - frame) as u64, Ordering::Relaxed);
                    data[frame * channels_out..].fill(<T as cpal::Sample>::from_sample::<f32>(0.0));
                    break;
                }
                for ch in 0..channels_out {
                    let sample = st.next_sample_mapped(channels_out, ch);
                    data[frame * channels_out + ch] = <T as cpal::Sample>::from_sample::<f32>(sample);
                }
                filled += 1;
            }

            if filled > 0 {
                counters.played_frames.fetch_add(filled as u64, Ordering::Relaxed);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Local buffer owned by the output callback.
///
/// Raw bytes are converted a whole frame at a time; a partial frame left by a read
/// stays in `raw` until the rest arrives.
pub(crate) struct CallbackState {
    pub(crate) pos: usize,
    src_channels: usize,
    pub(crate) src: Vec<f32>,
    raw: Vec<u8>,
    carry: usize,
}

impl CallbackState {
    pub(crate) fn new(src_channels: usize, refill_frames: usize) -> Self {
        let src_channels = src_channels.max(1);
        Self {
            pos: 0,
            src_channels,
            src: Vec::with_capacity(refill_frames * src_channels),
            raw: vec![0u8; refill_frames * src_channels * 2],
            carry: 0,
        }
    }

    /// Pull the next batch of frames from `source`. Returns `false` when none are ready.
    pub(crate) fn refill(&mut self, source: &RingBuffer) -> bool {
        let frame_bytes = self.src_channels * 2;
        let r = source.read(&mut self.raw[self.carry..], Duration::ZERO);
        let total = self.carry + r.consumed;
        let whole = total / frame_bytes * frame_bytes;

        self.src.clear();
        self.src.extend(
            self.raw[..whole]
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32_768.0),
        );
        self.raw.copy_within(whole..total, 0);
        self.carry = total - whole;
        self.pos = 0;
        !self.src.is_empty()
    }

    /// Read one output sample for `dst_ch`, applying a simple channel mapping.
    ///
    /// `pos` advances once per destination frame (after the last channel).
    pub(crate) fn next_sample_mapped(&mut self, dst_channels: usize, dst_ch: usize) -> f32 {
        if self.pos >= self.src.len() {
            return 0.0;
        }

        let frame_start = self.pos;
        let get_src = |ch: usize| -> f32 {
            if ch < self.src_channels && frame_start + ch < self.src.len() {
                self.src[frame_start + ch]
            } else {
                0.0
            }
        };

        let out = match (self.src_channels, dst_channels) {
            (1, 1) => get_src(0),
            (2, 2) => get_src(dst_ch.min(1)),
            (2, 1) => 0.5 * (get_src(0) + get_src(1)),
            (1, _) => get_src(0),
            _ => get_src(dst_ch.min(self.src_channels - 1)),
        };

        if dst_ch + 1 == dst_channels {
            self.pos += self.src_channels;
        }
        out
    }
}
