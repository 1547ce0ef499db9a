use std::time::Duration;

/// Sizing and timing parameters shared by the fetch/decode/playback stages.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Capacity of the fetch stage output ring (bytes).
    pub fetch_buffer_bytes: usize,
    /// Capacity of each decode stage ring, input and output (bytes).
    pub decode_buffer_bytes: usize,
    /// Decoder scratch window and staged PCM buffer size (bytes).
    pub decode_scratch_bytes: usize,
    /// Capacity of the playback stage input ring (bytes).
    pub playback_buffer_bytes: usize,
    /// Size of the controller's per-tick transfer buffer (bytes).
    pub transfer_bytes: usize,
    /// Depth of every command/event queue.
    pub queue_depth: usize,
    /// How long a stage blocks on an empty ring before looping.
    pub read_timeout: Duration,
    /// How long a stage waits for a command when it has nothing else to do.
    pub command_poll: Duration,
    /// Consecutive network read errors tolerated before the fetch stage gives up.
    pub max_read_retries: u32,
    /// Upper bound on bytes buffered while looking for the WAV `data` chunk.
    pub wav_header_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_buffer_bytes: 32 * 1024,
            decode_buffer_bytes: 16 * 1024,
            decode_scratch_bytes: 8 * 1024,
            playback_buffer_bytes: 32 * 1024,
            transfer_bytes: 32 * 1024,
            queue_depth: 10,
            read_timeout: Duration::from_millis(10),
            command_poll: Duration::from_millis(10),
            max_read_retries: 3,
            wav_header_limit: 4 * 1024,
        }
    }
}

impl PipelineConfig {
    /// Scale every ring by `kib` kibibytes, keeping the decode scratch at least one MP3 frame.
    pub fn with_buffer_kib(mut self, kib: usize) -> Self {
        let bytes = kib.max(4) * 1024;
        self.fetch_buffer_bytes = bytes;
        self.playback_buffer_bytes = bytes;
        self.transfer_bytes = bytes;
        self.decode_buffer_bytes = (bytes / 2).max(8 * 1024);
        self
    }
}
