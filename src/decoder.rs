//! Composite decoder: horizontal-sync PLL, vertical-sync state machine,
//! flywheel line pacing and grayscale raster reconstruction.
//!
//! Sync pulses ride on top of the envelope (negative modulation), so a run
//! of samples above the sync threshold is a pulse; its width classifies it
//! as horizontal sync or vertical serration. Only the first 20% of each
//! line is examined for pulses. A PI loop trims the samples-per-line
//! estimate against where each committed pulse landed, and the flywheel
//! keeps the raster advancing through signal loss.

use std::sync::Arc;

use tracing::debug;

use crate::demod::{AgcLevels, EnvelopeDemodulator};
use crate::framestore::DisplayFrameStore;
use crate::{FRAME_HEIGHT, FRAME_WIDTH, RAW_FRAME_BYTES};

// Receive-side timing, matched to the transmitter's line structure.
const FRAME_RATE: f64 = 30000.0 / 1001.0;
const LINES_PER_FRAME: f64 = 525.0;
const H_SYNC_DURATION_US: f64 = 4.7;
const FRONT_PORCH_US: f64 = 1.5;
const ACTIVE_VIDEO_US: f64 = 52.6;

// PI controller gains for the H-sync loop.
const KP: f64 = 0.002;
const KI: f64 = 0.0001;

/// Vertical-sync detection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VSyncState {
    /// Watching for a serration sequence to begin near the frame bottom.
    SearchVSync,
    /// Inside a run of long pulses, counting serrations.
    InVSync,
}

pub struct Decoder {
    // Timing derived from the sample rate
    initial_samples_per_line: f64,
    h_sync_pulse_width: usize,
    sync_search_window: usize,
    line_start_active_video: usize,
    line_end_active_video: usize,

    // Raster position and pulse measurement
    x: usize,
    y: usize,
    pixel_counter: usize,

    // H-sync PLL
    samples_per_line: f64,
    h_sync_error_accumulator: f64,

    // V-sync state machine
    v_sync_state: VSyncState,
    v_sync_serration_counter: u32,

    demod: EnvelopeDemodulator,
    magnitudes: Vec<f64>,
    frame: Vec<u8>,
    display: Arc<DisplayFrameStore>,
    frames_completed: u64,
}

impl Decoder {
    pub fn new(sample_rate: f64, display: Arc<DisplayFrameStore>) -> Self {
        let line_duration = 1.0 / (FRAME_RATE * LINES_PER_FRAME);
        let initial_samples_per_line = line_duration * sample_rate;
        let line_start_active_video =
            ((H_SYNC_DURATION_US + FRONT_PORCH_US) * 1e-6 * sample_rate) as usize;
        let line_end_active_video =
            line_start_active_video + (ACTIVE_VIDEO_US * 1e-6 * sample_rate) as usize;
        let decoder = Self {
            initial_samples_per_line,
            h_sync_pulse_width: (H_SYNC_DURATION_US * 1e-6 * sample_rate) as usize,
            // Pulses are searched for in the first 20% of each line
            sync_search_window: (initial_samples_per_line * 0.20) as usize,
            line_start_active_video,
            line_end_active_video,
            x: 0,
            y: 0,
            pixel_counter: 0,
            samples_per_line: initial_samples_per_line,
            h_sync_error_accumulator: 0.0,
            v_sync_state: VSyncState::SearchVSync,
            v_sync_serration_counter: 0,
            demod: EnvelopeDemodulator::new(),
            magnitudes: Vec::new(),
            frame: vec![0u8; RAW_FRAME_BYTES],
            display,
            frames_completed: 0,
        };
        debug!(
            samples_per_line = decoder.samples_per_line,
            h_sync_pulse_width = decoder.h_sync_pulse_width,
            sync_search_window = decoder.sync_search_window,
            active_start = decoder.line_start_active_video,
            active_end = decoder.line_end_active_video,
            "decoder initialized"
        );
        decoder
    }

    /// Demodulates and decodes one raw I/Q buffer from the SDR.
    pub fn process_iq(&mut self, iq: &[u8]) {
        let mut magnitudes = std::mem::take(&mut self.magnitudes);
        let levels = self.demod.demodulate(iq, &mut magnitudes);
        for &mag in &magnitudes {
            self.process_sample(mag, &levels);
        }
        self.magnitudes = magnitudes;
    }

    fn process_sample(&mut self, mag: f64, levels: &AgcLevels) {
        // Pulse measurement runs only inside the sync search window: count
        // consecutive above-threshold samples and commit the pulse at the
        // first sample below threshold.
        if self.x < self.sync_search_window {
            if mag >= levels.sync_threshold {
                self.pixel_counter += 1;
            } else {
                if self.pixel_counter > self.h_sync_pulse_width / 2 {
                    self.on_committed_pulse();
                    self.pixel_counter = 0;
                    // Sync samples carry no picture; skip drawing and advancing
                    return;
                }
                self.pixel_counter = 0;
            }
        }

        if self.y < FRAME_HEIGHT
            && self.x >= self.line_start_active_video
            && self.x < self.line_end_active_video
        {
            let span = (self.line_end_active_video - self.line_start_active_video) as f64;
            let relative = (self.x - self.line_start_active_video) as f64;
            let pixel_x = (relative / span * FRAME_WIDTH as f64) as usize;
            if pixel_x < FRAME_WIDTH {
                let brightness = ((levels.black_level - mag) * levels.level_coeff)
                    .clamp(0.0, 255.0) as u8;
                let idx = (self.y * FRAME_WIDTH + pixel_x) * 3;
                self.frame[idx] = brightness;
                self.frame[idx + 1] = brightness;
                self.frame[idx + 2] = brightness;
            }
        }

        self.x += 1;

        // Flywheel: coast to the next line at the estimated line length
        if self.x >= self.samples_per_line as usize {
            self.x = 0;
            self.y += 1;
        }
        if self.y >= FRAME_HEIGHT {
            self.y = 0;
            self.display.store(&self.frame);
            self.frames_completed += 1;
        }
    }

    fn on_committed_pulse(&mut self) {
        let long_pulse = self.pixel_counter > self.h_sync_pulse_width * 2;
        match self.v_sync_state {
            VSyncState::SearchVSync => {
                if self.y > FRAME_HEIGHT - 20 && long_pulse {
                    self.v_sync_state = VSyncState::InVSync;
                    self.v_sync_serration_counter = 1;
                } else {
                    // H-sync PLL: a late pulse (positive error) lengthens the
                    // line estimate, an early one shortens it.
                    let error = self.x as f64 - self.samples_per_line;
                    self.h_sync_error_accumulator += error * KI;
                    let correction = error * KP + self.h_sync_error_accumulator;
                    let min = self.initial_samples_per_line * 0.95;
                    let max = self.initial_samples_per_line * 1.05;
                    self.samples_per_line = (self.samples_per_line + correction).clamp(min, max);
                    self.y += 1;
                    self.x = 0;
                }
            }
            VSyncState::InVSync => {
                if long_pulse && self.v_sync_serration_counter < 6 {
                    self.v_sync_serration_counter += 1;
                } else {
                    // Serration run over; a valid V-sync restarts the raster
                    if self.v_sync_serration_counter >= 3 {
                        self.y = 0;
                        self.x = 0;
                        self.samples_per_line = self.initial_samples_per_line;
                        self.h_sync_error_accumulator = 0.0;
                    }
                    self.v_sync_state = VSyncState::SearchVSync;
                    self.v_sync_serration_counter = 0;
                }
            }
        }
    }

    /// Thread-safe copy of the latest completed frame.
    pub fn display_frame(&self) -> Vec<u8> {
        self.display.snapshot()
    }

    pub fn samples_per_line(&self) -> f64 {
        self.samples_per_line
    }

    pub fn initial_samples_per_line(&self) -> f64 {
        self.initial_samples_per_line
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }

    #[cfg(test)]
    fn raster_y(&self) -> usize {
        self.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framestore::{CompositeFrameStore, RawFrameStore};
    use crate::standard::{Standard, StandardDescriptor};
    use crate::synth::Synthesizer;
    use crate::txstream::ire_to_amplitude;

    const SAMPLE_RATE: f64 = 2e6;

    fn new_decoder() -> Decoder {
        Decoder::new(SAMPLE_RATE, Arc::new(DisplayFrameStore::new()))
    }

    /// Appends `n` samples of magnitude `mag` as biased I/Q bytes.
    fn push_mag(iq: &mut Vec<u8>, mag: u8, n: usize) {
        for _ in 0..n {
            iq.push(127 + mag);
            iq.push(127);
        }
    }

    #[test]
    fn pll_applies_pi_correction_to_committed_pulse() {
        // A single pulse ending inside the search window at x = 15 must
        // update the estimate by exactly Kp*e + Ki*e with e = 15 - initial.
        let mut decoder = new_decoder();
        let init = decoder.initial_samples_per_line();
        let mut iq = Vec::new();
        push_mag(&mut iq, 30, 5);
        push_mag(&mut iq, 100, 10);
        push_mag(&mut iq, 30, 5);
        decoder.process_iq(&iq);
        let error = 15.0 - init;
        let expected = init + error * KP + error * KI;
        assert!(
            (decoder.samples_per_line() - expected).abs() < 1e-12,
            "estimate {} vs expected {expected}",
            decoder.samples_per_line()
        );
        assert_eq!(decoder.raster_y(), 1, "a committed pulse starts the next line");
    }

    #[test]
    fn pulses_outside_search_window_are_ignored() {
        // A pulse past the first 20% of the line is never examined: the
        // estimate stays untouched and the flywheel paces the raster alone.
        let mut decoder = new_decoder();
        let init = decoder.initial_samples_per_line();
        let spl = init as usize;
        for _ in 0..5 {
            let mut iq = Vec::new();
            push_mag(&mut iq, 30, 40);
            push_mag(&mut iq, 100, 10);
            push_mag(&mut iq, 30, spl - 50);
            decoder.process_iq(&iq);
        }
        assert_eq!(decoder.samples_per_line(), init);
        assert_eq!(decoder.raster_y(), 5, "flywheel advanced one line per period");
    }

    #[test]
    fn pll_estimate_stays_clamped() {
        // In-window pulses committing near the line origin carry a large
        // negative position error; the loop must peg at the clamp instead
        // of running away.
        let mut decoder = new_decoder();
        let init = decoder.initial_samples_per_line();
        for _ in 0..300 {
            let mut iq = Vec::new();
            push_mag(&mut iq, 30, 5);
            push_mag(&mut iq, 100, 10);
            decoder.process_iq(&iq);
            let spl = decoder.samples_per_line();
            assert!(spl >= init * 0.95 - 1e-9 && spl <= init * 1.05 + 1e-9);
        }
        assert!(
            (decoder.samples_per_line() - init * 0.95).abs() < 1e-9,
            "estimate settles on the lower clamp"
        );
    }

    /// A pulse wide enough to classify long (> 2x H-sync width) whose
    /// below-threshold commit sample still falls inside the search window.
    /// The extra sample keeps the period aligned with the flywheel, since a
    /// commit consumes its sample without advancing `x`.
    fn long_pulse_line(iq: &mut Vec<u8>, spl: usize) {
        push_mag(iq, 30, 1);
        push_mag(iq, 100, 20);
        push_mag(iq, 30, spl - 20);
    }

    #[test]
    fn vsync_sequence_resets_raster_to_top() {
        let mut decoder = new_decoder();
        let spl = decoder.initial_samples_per_line() as usize;
        let init = decoder.initial_samples_per_line();

        // Coast the flywheel down to y = 470 on an empty signal
        let mut iq = Vec::new();
        push_mag(&mut iq, 30, (FRAME_HEIGHT - 10) * spl);
        decoder.process_iq(&iq);
        assert_eq!(decoder.raster_y(), FRAME_HEIGHT - 10);

        // Six long serration pulses one line apart, then an ordinary
        // H-sync pulse ends the sequence.
        let mut iq = Vec::new();
        for _ in 0..6 {
            long_pulse_line(&mut iq, spl);
        }
        push_mag(&mut iq, 30, 1);
        push_mag(&mut iq, 100, 10);
        push_mag(&mut iq, 30, 29);
        decoder.process_iq(&iq);

        assert_eq!(decoder.raster_y(), 0, "confirmed V-sync must restart the raster");
        assert_eq!(decoder.samples_per_line(), init, "PLL resets to nominal");
    }

    #[test]
    fn short_serration_run_is_a_false_alarm() {
        let mut decoder = new_decoder();
        let spl = decoder.initial_samples_per_line() as usize;

        let mut iq = Vec::new();
        push_mag(&mut iq, 30, (FRAME_HEIGHT - 10) * spl);
        decoder.process_iq(&iq);

        // Only two long pulses: below the serration minimum of three
        let mut iq = Vec::new();
        for _ in 0..2 {
            long_pulse_line(&mut iq, spl);
        }
        push_mag(&mut iq, 30, 1);
        push_mag(&mut iq, 100, 10);
        push_mag(&mut iq, 30, 29);
        decoder.process_iq(&iq);

        assert!(decoder.raster_y() >= FRAME_HEIGHT - 10, "no raster restart");
    }

    #[test]
    fn flywheel_keeps_raster_cycling_through_noise() {
        let mut decoder = new_decoder();
        let spl = decoder.initial_samples_per_line() as usize;
        // Deterministic xorshift noise in the middle of the AGC range
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            40 + (state % 41) as u8
        };

        let frame_samples = FRAME_HEIGHT * spl;
        for _ in 0..100 {
            let mut iq = Vec::with_capacity(frame_samples * 2);
            for _ in 0..frame_samples {
                iq.push(127 + next());
                iq.push(127);
            }
            decoder.process_iq(&iq);
        }
        // The raster kept advancing (no stall, no out-of-bounds panic) and
        // the line estimate never left its clamp band.
        assert!(decoder.frames_completed() >= 50);
        let init = decoder.initial_samples_per_line();
        let spl = decoder.samples_per_line();
        assert!(spl >= init * 0.95 - 1e-9 && spl <= init * 1.05 + 1e-9);
    }

    #[test]
    fn colorbar_frame_survives_the_envelope_round_trip() {
        // Synthesize NTSC bars, map IRE to the AM envelope the transmitter
        // would radiate, feed the quantized envelope back through the
        // decoder, and check the raster shows seven falling gray steps.
        let rate = 8e6;
        let desc = StandardDescriptor::new(Standard::Ntsc, rate);
        let raw = Arc::new(RawFrameStore::new());
        let composite = Arc::new(CompositeFrameStore::new(desc.frame_samples()));
        let mut synth = Synthesizer::new(desc, raw, composite.clone());
        synth.fill_test_pattern();
        synth.generate_full_frame();
        let frame = composite.latest();

        let mut iq = Vec::with_capacity(frame.len() * 2);
        for &ire in frame.iter() {
            let i_sample = (ire_to_amplitude(ire) * 127.0).round().clamp(-128.0, 127.0) as i8;
            iq.push((127i16 + i_sample as i16) as u8);
            iq.push(127);
        }

        let display = Arc::new(DisplayFrameStore::new());
        let mut decoder = Decoder::new(rate, display.clone());
        for _ in 0..6 {
            decoder.process_iq(&iq);
        }
        assert!(decoder.frames_completed() >= 3, "receiver must lock onto the signal");

        // Mean brightness of lit pixels per bar, for every row where all
        // seven bars carry pixels. Rows whose line saw an early commit get
        // skipped by the raster and stay dark, so not every row qualifies.
        let raster = display.snapshot();
        let bar_width = FRAME_WIDTH / 7;
        let row_means = |y: usize| -> Option<[f64; 7]> {
            let row = y * FRAME_WIDTH * 3;
            let mut means = [0.0f64; 7];
            for bar in 0..7 {
                let (mut sum, mut n) = (0.0f64, 0u32);
                for x in bar * bar_width + 15..(bar + 1) * bar_width - 15 {
                    let v = raster[row + x * 3];
                    if v > 0 {
                        sum += v as f64;
                        n += 1;
                    }
                }
                if n == 0 {
                    return None;
                }
                means[bar] = sum / n as f64;
            }
            Some(means)
        };

        let mut lit_rows = 0u32;
        let mut monotonic_rows = 0u32;
        for y in 0..FRAME_HEIGHT {
            let Some(means) = row_means(y) else { continue };
            lit_rows += 1;
            if means.windows(2).all(|pair| pair[0] > pair[1]) {
                monotonic_rows += 1;
            }
            assert!(means[0] > 140.0, "row {y}: gray bar dim ({})", means[0]);
            assert!(means[6] < 70.0, "row {y}: blue bar bright ({})", means[6]);
        }
        assert!(lit_rows >= 100, "expected a mostly-painted raster, got {lit_rows} rows");
        assert!(
            monotonic_rows * 2 >= lit_rows,
            "most rows show falling gray steps ({monotonic_rows} of {lit_rows})"
        );
    }

    #[test]
    fn completed_frame_reaches_display_store() {
        let display = Arc::new(DisplayFrameStore::new());
        let mut decoder = Decoder::new(SAMPLE_RATE, display.clone());
        let spl = decoder.initial_samples_per_line() as usize;

        // A full frame of lines whose active video sits at peak white
        // (minimum envelope) decodes to a bright raster.
        let mut iq = Vec::new();
        for _ in 0..FRAME_HEIGHT + 2 {
            push_mag(&mut iq, 100, 10);
            push_mag(&mut iq, 10, spl - 10);
        }
        decoder.process_iq(&iq);
        assert!(decoder.frames_completed() >= 1);

        // Each active sample lights one column; rows whose line was cut
        // short by an early commit stay dark, so count rows that got paint.
        let frame = display.snapshot();
        let mut bright_rows = 0;
        for y in 0..FRAME_HEIGHT {
            let row = y * FRAME_WIDTH * 3;
            for x in 0..FRAME_WIDTH {
                let idx = row + x * 3;
                if frame[idx] > 200 {
                    assert_eq!(frame[idx], frame[idx + 1]);
                    assert_eq!(frame[idx], frame[idx + 2]);
                    bright_rows += 1;
                    break;
                }
            }
        }
        assert!(bright_rows >= 150, "expected a mostly-bright raster, got {bright_rows} rows");
    }
}
