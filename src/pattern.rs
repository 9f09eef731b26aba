//! SMPTE colorbar test pattern for the `--test` transmit mode.

use crate::{FRAME_HEIGHT, FRAME_WIDTH};

/// The seven 75%-amplitude bars, left to right.
const BAR_COLORS: [[u8; 3]; 7] = [
    [192, 192, 192], // Gray
    [192, 192, 0],   // Yellow
    [0, 192, 192],   // Cyan
    [0, 192, 0],     // Green
    [192, 0, 192],   // Magenta
    [192, 0, 0],     // Red
    [0, 0, 192],     // Blue
];

/// Fills an RGB24 raster with seven vertical colorbars.
pub fn fill_color_bars(buf: &mut [u8]) {
    let bar_width = FRAME_WIDTH / 7;
    for y in 0..FRAME_HEIGHT {
        for x in 0..FRAME_WIDTH {
            let bar = (x / bar_width).min(6);
            let i = (y * FRAME_WIDTH + x) * 3;
            buf[i] = BAR_COLORS[bar][0];
            buf[i + 1] = BAR_COLORS[bar][1];
            buf[i + 2] = BAR_COLORS[bar][2];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RAW_FRAME_BYTES;

    #[test]
    fn bars_cover_frame() {
        let mut buf = vec![0u8; RAW_FRAME_BYTES];
        fill_color_bars(&mut buf);
        // First bar is gray, last bar is blue, on every row
        for y in [0, FRAME_HEIGHT / 2, FRAME_HEIGHT - 1] {
            let row = y * FRAME_WIDTH * 3;
            assert_eq!(&buf[row..row + 3], &[192, 192, 192]);
            let last = row + (FRAME_WIDTH - 1) * 3;
            assert_eq!(&buf[last..last + 3], &[0, 0, 192]);
        }
        // Bar boundary: pixel 76 is gray, pixel 77 is yellow
        let bar_width = FRAME_WIDTH / 7;
        let i = (bar_width - 1) * 3;
        assert_eq!(&buf[i..i + 3], &[192, 192, 192]);
        let i = bar_width * 3;
        assert_eq!(&buf[i..i + 3], &[192, 192, 0]);
    }
}
