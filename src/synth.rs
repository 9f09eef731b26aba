//! Composite-signal synthesizer.
//!
//! Lays down one full interlaced frame of IRE samples per tick: horizontal
//! sync, equalizing pulses, the serrated vertical-sync interval, back-porch
//! color burst and quadrature-modulated chroma (YIQ for NTSC, YUV with the
//! alternating V axis for PAL), all against a single subcarrier phase
//! accumulator that runs continuously across the frame.

use std::f64::consts::PI;
use std::sync::Arc;

use crate::framestore::{CompositeFrameStore, RawFrameStore};
use crate::pattern::fill_color_bars;
use crate::standard::{Standard, StandardDescriptor};
use crate::{FRAME_HEIGHT, FRAME_WIDTH};

/// How a scanline's sync interval was classified.
enum LineSync {
    /// Equalizing or serration pulses only; no picture content on this line.
    PulsesOnly,
    /// Regular H-sync; the line may carry active video.
    Normal,
}

pub struct Synthesizer {
    desc: StandardDescriptor,
    raw: Arc<RawFrameStore>,
    composite: Arc<CompositeFrameStore>,
    // Recycled frame buffers; a slot is reusable once the TX callback that
    // held it has returned.
    spare: Vec<Arc<Vec<f64>>>,
}

impl Synthesizer {
    pub fn new(
        desc: StandardDescriptor,
        raw: Arc<RawFrameStore>,
        composite: Arc<CompositeFrameStore>,
    ) -> Self {
        Self {
            desc,
            raw,
            composite,
            spare: Vec::with_capacity(2),
        }
    }

    pub fn descriptor(&self) -> &StandardDescriptor {
        &self.desc
    }

    /// Writes SMPTE colorbars into the raw frame store (`--test` mode).
    pub fn fill_test_pattern(&self) {
        self.raw.fill_with(fill_color_bars);
    }

    /// Synthesizes one complete composite frame from the current RGB raster
    /// and publishes it for the TX streamer. Infallible.
    pub fn generate_full_frame(&mut self) {
        let mut frame = self.take_frame_buffer();
        {
            let buf = Arc::get_mut(&mut frame).expect("spare frame buffer still shared");
            let raw = self.raw.read();
            self.generate_into(buf, &raw);
        }
        let old = self.composite.publish(frame);
        if self.spare.len() < 2 {
            self.spare.push(old);
        }
    }

    fn take_frame_buffer(&mut self) -> Arc<Vec<f64>> {
        if let Some(i) = self.spare.iter().position(|f| Arc::strong_count(f) == 1) {
            self.spare.swap_remove(i)
        } else {
            Arc::new(vec![0.0; self.desc.frame_samples()])
        }
    }

    fn generate_into(&self, frame: &mut [f64], raw: &[u8]) {
        let d = &self.desc;
        let phase_increment = 2.0 * PI * d.fsc / d.sample_rate;
        let mut subcarrier_phase = 0.0f64;
        let mut v_toggle = 1.0f64;

        for line in 1..=d.lines_per_frame {
            let offset = (line - 1) * d.line_samples;
            let line_buf = &mut frame[offset..offset + d.line_samples];
            line_buf.fill(d.level_blanking);

            let sync = match d.standard {
                Standard::Ntsc => self.ntsc_sync(line, line_buf),
                Standard::Pal => self.pal_sync(line, line_buf),
            };
            let vbi = self.is_vbi(line);

            // Luminance overlay; pulse-only lines carry no picture
            if !vbi && matches!(sync, LineSync::Normal) {
                for s in 0..d.active_samples {
                    let pos = d.active_start_samples + s;
                    line_buf[pos] = self.pixel_components(raw, line, pos).0;
                }
            }

            // Burst and chroma ride on top of every line outside the VBI.
            // The active-region pass is not gated on the line classification:
            // out-of-raster lines contribute zero chroma through the pixel
            // lookup's range check.
            if !vbi {
                let burst_phase = self.burst_phase(line);
                for s in 0..d.line_samples {
                    if s >= d.burst_start_samples && s < d.burst_end_samples {
                        line_buf[s] +=
                            d.burst_amplitude * (subcarrier_phase + burst_phase).sin();
                    } else if s >= d.active_start_samples
                        && s < d.active_start_samples + d.active_samples
                    {
                        let (_, c1, c2) = self.pixel_components(raw, line, s);
                        line_buf[s] += match d.standard {
                            Standard::Ntsc => {
                                c1 * subcarrier_phase.cos() + c2 * subcarrier_phase.sin()
                            }
                            Standard::Pal => {
                                c1 * subcarrier_phase.sin()
                                    + c2 * v_toggle * subcarrier_phase.cos()
                            }
                        };
                    }
                    subcarrier_phase += phase_increment;
                }
            } else {
                // Keep the subcarrier continuous across blanked lines
                subcarrier_phase += phase_increment * d.line_samples as f64;
            }
            v_toggle = -v_toggle;
        }
    }

    /// NTSC line classification: equalizing pulses on field lines 1-3 and
    /// 7-9, serrated vertical sync on 4-6, plain H-sync everywhere else.
    fn ntsc_sync(&self, line: usize, line_buf: &mut [f64]) -> LineSync {
        let d = &self.desc;
        let half_frame = d.lines_per_frame / 2;
        let line_in_field = if line > half_frame {
            line - half_frame
        } else {
            line
        };
        let half_line = d.line_samples / 2;
        match line_in_field {
            1..=3 | 7..=9 => {
                for s in 0..d.eq_pulse_samples {
                    line_buf[s] = d.level_sync;
                    line_buf[half_line + s] = d.level_sync;
                }
                LineSync::PulsesOnly
            }
            4..=6 => {
                for s in 0..d.v_sync_pulse_samples {
                    line_buf[s] = d.level_sync;
                    line_buf[half_line + s] = d.level_sync;
                }
                LineSync::PulsesOnly
            }
            _ => {
                for s in 0..d.h_sync_samples {
                    line_buf[s] = d.level_sync;
                }
                LineSync::Normal
            }
        }
    }

    /// PAL sync: H-sync on every line, plus a half-line-offset pulse on the
    /// four field-boundary lines. (A full PAL serration pattern would cover
    /// more lines; receivers lock fine on this reduced set.)
    fn pal_sync(&self, line: usize, line_buf: &mut [f64]) -> LineSync {
        let d = &self.desc;
        for s in 0..d.h_sync_samples {
            line_buf[s] = d.level_sync;
        }
        if matches!(line, 1 | 2 | 313 | 314) {
            let half_line = d.line_samples / 2;
            for s in half_line..half_line + d.h_sync_samples {
                line_buf[s] = d.level_sync;
            }
        }
        LineSync::Normal
    }

    fn is_vbi(&self, line: usize) -> bool {
        match self.desc.standard {
            Standard::Ntsc => (1..=21).contains(&line) || (264..=284).contains(&line),
            Standard::Pal => line >= 624 || line <= 23 || (311..=336).contains(&line),
        }
    }

    fn burst_phase(&self, line: usize) -> f64 {
        match self.desc.standard {
            Standard::Ntsc => PI,
            // Swinging burst: +135 degrees on odd lines, -135 on even
            Standard::Pal => {
                if line % 2 == 0 {
                    -135.0 * PI / 180.0
                } else {
                    135.0 * PI / 180.0
                }
            }
        }
    }

    /// Luma plus the two chroma components for the standard in use.
    fn pixel_components(&self, raw: &[u8], line: usize, sample_in_line: usize) -> (f64, f64, f64) {
        match self.desc.standard {
            Standard::Ntsc => self.pixel_yiq(raw, line, sample_in_line),
            Standard::Pal => self.pixel_yuv(raw, line, sample_in_line),
        }
    }

    /// Maps a composite line/sample position back to a source pixel and
    /// converts it to YIQ, in IRE. Out-of-raster positions return black.
    fn pixel_yiq(&self, raw: &[u8], line: usize, sample_in_line: usize) -> (f64, f64, f64) {
        let d = &self.desc;
        let video_line = match line {
            22..=263 => (line - 22) * 2,
            285..=525 => (line - 285) * 2 + 1,
            _ => return (d.level_black, 0.0, 0.0),
        };
        match self.fetch_rgb(raw, video_line, sample_in_line) {
            Some((r, g, b)) => {
                let y = 0.299 * r + 0.587 * g + 0.114 * b;
                let i = 0.596 * r - 0.274 * g - 0.322 * b;
                let q = 0.211 * r - 0.523 * g + 0.312 * b;
                let k = d.luma_scale();
                (d.level_black + y * k, i * k, q * k)
            }
            None => (d.level_black, 0.0, 0.0),
        }
    }

    /// PAL equivalent of [`Self::pixel_yiq`], with the U/V gain factors
    /// folded in.
    fn pixel_yuv(&self, raw: &[u8], line: usize, sample_in_line: usize) -> (f64, f64, f64) {
        let d = &self.desc;
        let video_line = match line {
            24..=310 => line - 24,
            337..=623 => line - 337 + d.active_video_lines / 2,
            _ => return (d.level_black, 0.0, 0.0),
        };
        match self.fetch_rgb(raw, video_line, sample_in_line) {
            Some((r, g, b)) => {
                let y = 0.299 * r + 0.587 * g + 0.114 * b;
                let u = -0.147 * r - 0.289 * g + 0.436 * b;
                let v = 0.615 * r - 0.515 * g - 0.100 * b;
                let k = d.luma_scale();
                (d.level_black + y * k, u * k * 0.493, v * k * 0.877)
            }
            None => (d.level_black, 0.0, 0.0),
        }
    }

    fn fetch_rgb(
        &self,
        raw: &[u8],
        video_line: usize,
        sample_in_line: usize,
    ) -> Option<(f64, f64, f64)> {
        let d = &self.desc;
        let sample_in_active = sample_in_line as isize - d.active_start_samples as isize;
        let pixel_x = (sample_in_active as f64 / d.active_samples as f64 * FRAME_WIDTH as f64)
            as isize;
        if video_line >= FRAME_HEIGHT || !(0..FRAME_WIDTH as isize).contains(&pixel_x) {
            return None;
        }
        let idx = (video_line * FRAME_WIDTH + pixel_x as usize) * 3;
        Some((
            raw[idx] as f64,
            raw[idx + 1] as f64,
            raw[idx + 2] as f64,
        ))
    }
}
