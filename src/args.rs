//! Argument parsing for running from the command line

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

/// Transmitter (tvtx) arguments.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct TxArgs {
    /// Transmit frequency in MHz
    #[clap(short, long, default_value_t = 1280.0)]
    pub freq: f64,
    /// Channel bandwidth in MHz (the output sample rate is bw * 1e6)
    #[clap(short, long, default_value_t = 1.5)]
    pub bw: f64,
    /// TX VGA gain
    #[clap(short, long, default_value_t = 30)]
    #[clap(value_parser = clap::value_parser!(u32).range(0..=47))]
    pub gain: u32,
    /// Video capture device name or index (OS-dependent)
    #[clap(short, long)]
    pub device: Option<String>,
    /// Callsign overlaid on the outgoing video
    #[clap(short, long, default_value = "NOCALL")]
    pub callsign: String,
    /// Transmit SMPTE colorbars instead of the capture device
    #[clap(long)]
    pub test: bool,
    /// Generate PAL instead of NTSC
    #[clap(long)]
    pub pal: bool,
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl TxArgs {
    /// Output sample rate in Hz, derived from the channel bandwidth.
    pub fn sample_rate(&self) -> f64 {
        self.bw * 1e6
    }
}

/// Receiver (tvrx) arguments.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct RxArgs {
    /// Center frequency in MHz
    #[clap(short, long, default_value_t = 1280.0)]
    pub freq: f64,
    /// Tuner bandwidth in MHz (the capture sample rate is bw * 1e6)
    #[clap(short, long, default_value_t = 1.5)]
    pub bw: f64,
    /// Tuner gain in tenths of a dB (e.g. 496 for 49.6 dB)
    #[clap(short, long, default_value_t = 496)]
    pub gain: i32,
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl RxArgs {
    /// Capture sample rate in Hz, derived from the tuner bandwidth.
    pub fn sample_rate(&self) -> f64 {
        self.bw * 1e6
    }
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}
