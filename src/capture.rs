//! FFmpeg capture subprocess and the raw-frame reader thread.
//!
//! FFmpeg is asked for raw rgb24 frames at the standard's rate, scaled to
//! the fixed capture geometry, written to stdout as an unframed byte
//! stream. The reader thread pulls whole frames off the pipe and publishes
//! them to the shared raw frame store. A broken pipe only ends the reader;
//! the synthesizer keeps transmitting the last frame, which is still legal
//! video.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{info, warn};

use crate::framestore::RawFrameStore;
use crate::standard::Standard;
use crate::{FRAME_HEIGHT, FRAME_WIDTH, RAW_FRAME_BYTES};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("unsupported OS: {0}")]
    UnsupportedOs(String),

    #[error("failed to start ffmpeg: {0}")]
    Spawn(#[from] std::io::Error),
}

pub struct CaptureConfig {
    pub device: Option<String>,
    pub callsign: String,
    pub standard: Standard,
}

impl CaptureConfig {
    fn fps(&self) -> &'static str {
        match self.standard {
            Standard::Ntsc => "30000/1001",
            Standard::Pal => "25",
        }
    }

    /// OS-specific input arguments for the capture device.
    fn input_args(&self) -> Result<Vec<String>, CaptureError> {
        let os = std::env::consts::OS;
        let (format, default_dev) = match os {
            "linux" => ("v4l2", "/dev/video0"),
            "macos" => ("avfoundation", "0"),
            "windows" => ("dshow", "Integrated Webcam"),
            other => return Err(CaptureError::UnsupportedOs(other.to_string())),
        };
        let device = self.device.clone().unwrap_or_else(|| default_dev.to_string());
        let input = if os == "windows" {
            format!("video={device}")
        } else {
            device
        };
        Ok(vec!["-f".into(), format.into(), "-i".into(), input])
    }

    /// The scale/fps/overlay video filter chain.
    fn filter_arg(&self) -> String {
        let base = format!("scale={FRAME_WIDTH}:{FRAME_HEIGHT},fps={}", self.fps());
        if self.callsign.is_empty() {
            return base;
        }
        // Callsign in a dark box along the bottom edge
        format!(
            "{base},drawbox=x=0:y=ih-40:w=iw:h=40:color=black@0.6:t=fill,\
             drawtext=fontfile=/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf:\
             text='{}':x=10:y=h-35:fontcolor=white:fontsize=32:borderw=2:bordercolor=black",
            self.callsign
        )
    }
}

/// Spawns FFmpeg and a reader thread that keeps `raw` updated with the
/// latest captured frame.
pub fn start_capture(
    cfg: &CaptureConfig,
    raw: Arc<RawFrameStore>,
    running: Arc<AtomicBool>,
) -> Result<(Child, JoinHandle<()>), CaptureError> {
    let mut args = cfg.input_args()?;
    args.extend(
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-fflags",
            "nobuffer",
            "-flags",
            "low_delay",
            "-probesize",
            "32",
            "-analyzeduration",
            "0",
            "-threads",
            "1",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-vf",
        ]
        .map(String::from),
    );
    args.push(cfg.filter_arg());
    args.push("-".into());

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdout(Stdio::piped())
        .spawn()?;
    let mut stdout = child.stdout.take().expect("ffmpeg stdout was piped");
    info!("ffmpeg capture started");

    let reader = std::thread::spawn(move || {
        let mut frame = vec![0u8; RAW_FRAME_BYTES];
        while running.load(Ordering::Relaxed) {
            if let Err(e) = stdout.read_exact(&mut frame) {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    info!("capture stream ended");
                } else {
                    warn!("capture pipe read failed: {e}");
                }
                break;
            }
            raw.write_frame(&frame);
        }
    });

    Ok((child, reader))
}
