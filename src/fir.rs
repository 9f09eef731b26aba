//! Blackman-windowed sinc low-pass filter design.
//!
//! Generates taps for channel filtering ahead of the transmitter. The tap
//! generator is part of the library surface; the streaming path currently
//! sends the unfiltered composite signal.

use std::f64::consts::PI;

/// Computes `num_taps` FIR low-pass coefficients for the given bandwidth,
/// normalized to unit DC gain.
pub fn new_low_pass_taps(num_taps: usize, bandwidth: f64, sample_rate: f64) -> Vec<f64> {
    let cutoff = bandwidth / 2.0;
    let normalized_cutoff = cutoff / sample_rate;
    let m = (num_taps - 1) as f64;

    let mut taps = Vec::with_capacity(num_taps);
    let mut sum = 0.0;
    for i in 0..num_taps {
        let n = i as f64;
        let window = 0.42 - 0.5 * (2.0 * PI * n / m).cos() + 0.08 * (4.0 * PI * n / m).cos();
        let sinc = if (n - m / 2.0).abs() < f64::EPSILON {
            2.0 * PI * normalized_cutoff
        } else {
            (2.0 * PI * normalized_cutoff * (n - m / 2.0)).sin() / (n - m / 2.0)
        };
        let tap = sinc * window;
        sum += tap;
        taps.push(tap);
    }
    for tap in &mut taps {
        *tap /= sum;
    }
    taps
}
