use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "streamer", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Size of every stage ring buffer in KiB (built-in sizes when omitted)
    #[arg(long, global = true)]
    pub buffer_kib: Option<usize>,

    /// Controller tick interval in milliseconds
    #[arg(long, default_value_t = 5, global = true)]
    pub tick_ms: u64,

    /// Print the player status as one JSON line per second
    #[arg(long, global = true)]
    pub status_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream a URL or local file through the fetch, decode and playback stages
    Play {
        /// http(s) URL or path to a WAV/MP3 file
        source: String,

        /// Container of the source; guessed from the URL or file contents when omitted
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Play a WAV URL or file straight through the playback stage
    PlayWav {
        /// http(s) URL or path to a WAV file
        source: String,
    },

    /// List output devices and exit
    ListDevices,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Wav,
    Mp3,
}
