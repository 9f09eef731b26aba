//! FFplay display subprocess for the receive side.
//!
//! The player accepts raw rgb24 frames on stdin at the capture geometry and
//! frame rate; the receiver pushes completed rasters into it at its own
//! pace. The player window closing is a normal exit path.

use std::io::Write;
use std::process::{Child, ChildStdin, Command, Stdio};

use thiserror::Error;
use tracing::info;

use crate::{FRAME_HEIGHT, FRAME_WIDTH};

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("failed to start ffplay: {0}")]
    Spawn(#[from] std::io::Error),
}

pub struct DisplaySink {
    child: Child,
    stdin: ChildStdin,
}

impl DisplaySink {
    /// Launches ffplay configured for our raw video stream.
    pub fn start(frame_rate: f64) -> Result<Self, DisplayError> {
        let mut child = Command::new("ffplay")
            .args([
                "-f",
                "rawvideo",
                "-pixel_format",
                "rgb24",
                "-video_size",
                &format!("{FRAME_WIDTH}x{FRAME_HEIGHT}"),
                "-framerate",
                &format!("{frame_rate}"),
                "-i",
                "-",
                "-window_title",
                "TV Receiver",
                "-fflags",
                "nobuffer",
                "-flags",
                "low_delay",
            ])
            .stdin(Stdio::piped())
            .spawn()?;
        let stdin = child.stdin.take().expect("ffplay stdin was piped");
        info!("ffplay started; video window should appear");
        Ok(Self { child, stdin })
    }

    /// Writes one raw rgb24 frame. An error means the player went away and
    /// the receiver should shut down.
    pub fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.stdin.write_all(frame)
    }

    /// Terminates the player process.
    pub fn stop(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
