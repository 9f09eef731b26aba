//! Video standard descriptors: all timing and level constants for NTSC and
//! PAL, with the microsecond intervals converted to sample counts at the
//! configured output rate.

use std::time::Duration;

/// The two supported composite video standards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standard {
    Ntsc,
    Pal,
}

/// Immutable parameter block for one standard at one sample rate.
///
/// Levels are in IRE (sync tip -40, blanking 0, peak white 100). Sample
/// counts are truncated from `interval_s * sample_rate`, matching the
/// reference timing tables.
#[derive(Debug, Clone)]
pub struct StandardDescriptor {
    pub standard: Standard,
    pub sample_rate: f64,
    pub frame_rate: f64,
    pub lines_per_frame: usize,
    pub active_video_lines: usize,
    /// Color subcarrier frequency in Hz.
    pub fsc: f64,
    pub level_sync: f64,
    pub level_blanking: f64,
    pub level_black: f64,
    pub level_white: f64,
    pub burst_amplitude: f64,
    // Derived sample counts
    pub line_samples: usize,
    pub h_sync_samples: usize,
    pub v_sync_pulse_samples: usize,
    pub eq_pulse_samples: usize,
    pub burst_start_samples: usize,
    pub burst_end_samples: usize,
    pub active_start_samples: usize,
    pub active_samples: usize,
}

impl StandardDescriptor {
    pub fn new(standard: Standard, sample_rate: f64) -> Self {
        match standard {
            Standard::Ntsc => Self::ntsc(sample_rate),
            Standard::Pal => Self::pal(sample_rate),
        }
    }

    fn ntsc(sample_rate: f64) -> Self {
        let frame_rate = 30000.0 / 1001.0;
        let lines_per_frame = 525;
        let line_duration = 1.0 / (frame_rate * lines_per_frame as f64);
        let burst_start = (5.6e-6 * sample_rate) as usize;
        Self {
            standard: Standard::Ntsc,
            sample_rate,
            frame_rate,
            lines_per_frame,
            active_video_lines: 480,
            fsc: 3_579_545.4545,
            level_sync: -40.0,
            level_blanking: 0.0,
            level_black: 7.5,
            level_white: 100.0,
            burst_amplitude: 20.0,
            line_samples: (line_duration * sample_rate) as usize,
            h_sync_samples: (4.7e-6 * sample_rate) as usize,
            v_sync_pulse_samples: (27.1e-6 * sample_rate) as usize,
            eq_pulse_samples: (2.3e-6 * sample_rate) as usize,
            burst_start_samples: burst_start,
            burst_end_samples: burst_start + (2.5e-6 * sample_rate) as usize,
            active_start_samples: (10.7e-6 * sample_rate) as usize,
            active_samples: (52.6e-6 * sample_rate) as usize,
        }
    }

    fn pal(sample_rate: f64) -> Self {
        let frame_rate = 25.0;
        let lines_per_frame = 625;
        let line_duration = 1.0 / (frame_rate * lines_per_frame as f64);
        let burst_start = (5.6e-6 * sample_rate) as usize;
        Self {
            standard: Standard::Pal,
            sample_rate,
            frame_rate,
            lines_per_frame,
            active_video_lines: 576,
            fsc: 4_433_618.75,
            level_sync: -40.0,
            level_blanking: 0.0,
            level_black: 0.0,
            level_white: 100.0,
            burst_amplitude: 20.0,
            line_samples: (line_duration * sample_rate) as usize,
            h_sync_samples: (4.7e-6 * sample_rate) as usize,
            v_sync_pulse_samples: (27.3e-6 * sample_rate) as usize,
            eq_pulse_samples: (2.35e-6 * sample_rate) as usize,
            burst_start_samples: burst_start,
            burst_end_samples: burst_start + (2.25e-6 * sample_rate) as usize,
            active_start_samples: (10.5e-6 * sample_rate) as usize,
            active_samples: (52.0e-6 * sample_rate) as usize,
        }
    }

    /// Samples in one full composite frame.
    pub fn frame_samples(&self) -> usize {
        self.line_samples * self.lines_per_frame
    }

    /// Wall-clock duration of one frame, for the synthesizer ticker.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }

    /// IRE span between reference black and peak white, per 8-bit RGB step.
    pub fn luma_scale(&self) -> f64 {
        (self.level_white - self.level_black) / 255.0
    }
}
