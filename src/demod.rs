//! AM envelope demodulation with running AGC.
//!
//! Converts interleaved unsigned-8 I/Q from the RTL-SDR into a magnitude
//! stream and tracks smoothed envelope extrema across buffers. The signal is
//! negative AM: the sync tip is the largest envelope, peak white the
//! smallest.

use num_complex::Complex;

/// Working signal levels derived from the AGC state, recomputed per buffer.
#[derive(Debug, Clone, Copy)]
pub struct AgcLevels {
    /// Envelope above this is treated as sync pulse.
    pub sync_threshold: f64,
    /// Envelope corresponding to reference black.
    pub black_level: f64,
    /// Scale from (black - mag) to 8-bit brightness.
    pub level_coeff: f64,
}

pub struct EnvelopeDemodulator {
    smoothed_max: f64,
    smoothed_min: f64,
}

impl EnvelopeDemodulator {
    pub fn new() -> Self {
        Self {
            smoothed_max: 128.0,
            smoothed_min: 0.0,
        }
    }

    /// Demodulates one I/Q buffer into `out` and folds the buffer's envelope
    /// extrema into the smoothed AGC state.
    pub fn demodulate(&mut self, iq: &[u8], out: &mut Vec<f64>) -> AgcLevels {
        out.clear();
        out.reserve(iq.len() / 2);
        let mut local_max = 0.0f64;
        let mut local_min = 255.0f64;
        for pair in iq.chunks_exact(2) {
            let mag = Complex::new(pair[0] as f64 - 127.0, pair[1] as f64 - 127.0).norm();
            if mag > local_max {
                local_max = mag;
            }
            if mag < local_min {
                local_min = mag;
            }
            out.push(mag);
        }
        self.smoothed_max = self.smoothed_max * 0.95 + local_max * 0.05;
        self.smoothed_min = self.smoothed_min * 0.95 + local_min * 0.05;
        self.levels()
    }

    /// Levels for the current AGC state.
    pub fn levels(&self) -> AgcLevels {
        let sync_tip = self.smoothed_max;
        let peak_white = self.smoothed_min;
        let black_level = sync_tip * 0.65;
        AgcLevels {
            sync_threshold: sync_tip * 0.75,
            black_level,
            level_coeff: 255.0 / (black_level - peak_white + 1e-6),
        }
    }

    pub fn smoothed_max(&self) -> f64 {
        self.smoothed_max
    }

    pub fn smoothed_min(&self) -> f64 {
        self.smoothed_min
    }
}

impl Default for EnvelopeDemodulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds an I/Q pair whose magnitude is exactly `mag` (Q at bias).
    fn iq_of(mag: u8) -> [u8; 2] {
        [127 + mag, 127]
    }

    #[test]
    fn magnitude_of_biased_pairs() {
        let mut demod = EnvelopeDemodulator::new();
        let mut out = Vec::new();
        let iq = [127u8, 127, 127 + 30, 127, 127, 127 + 40];
        demod.demodulate(&iq, &mut out);
        assert_eq!(out.len(), 3);
        assert!(out[0].abs() < 1e-12);
        assert!((out[1] - 30.0).abs() < 1e-12);
        assert!((out[2] - 40.0).abs() < 1e-12);
    }

    #[test]
    fn ema_stays_between_previous_and_local_extremum() {
        let mut demod = EnvelopeDemodulator::new();
        let mut out = Vec::new();
        for _ in 0..50 {
            let prev_max = demod.smoothed_max();
            let prev_min = demod.smoothed_min();
            let iq: Vec<u8> = [iq_of(100), iq_of(20)].concat();
            demod.demodulate(&iq, &mut out);
            let (local_min, local_max): (f64, f64) = (20.0, 100.0);
            assert!(demod.smoothed_max() >= local_max.min(prev_max) - 1e-9);
            assert!(demod.smoothed_max() <= local_max.max(prev_max) + 1e-9);
            assert!(demod.smoothed_min() >= local_min.min(prev_min) - 1e-9);
            assert!(demod.smoothed_min() <= local_min.max(prev_min) + 1e-9);
        }
        // Converged to the buffer extrema
        assert!((demod.smoothed_max() - 100.0).abs() < 10.0);
        assert!((demod.smoothed_min() - 20.0).abs() < 10.0);
    }

    #[test]
    fn levels_follow_sync_tip() {
        let mut demod = EnvelopeDemodulator::new();
        let mut out = Vec::new();
        let iq: Vec<u8> = (0..200).flat_map(|_| [iq_of(100), iq_of(20)].concat()).collect();
        let mut levels = demod.levels();
        for _ in 0..200 {
            levels = demod.demodulate(&iq, &mut out);
        }
        let tip = demod.smoothed_max();
        assert!((levels.sync_threshold - tip * 0.75).abs() < 1e-9);
        assert!((levels.black_level - tip * 0.65).abs() < 1e-9);
        assert!(levels.level_coeff > 0.0);
    }
}
