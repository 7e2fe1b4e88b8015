//! Blanked-screen detection.
//!
//! The game occasionally blanks the view as an automation countermeasure.
//! A frame counts as blanked when at least `threshold` of its pixels are
//! pure black; real night scenes keep enough non-zero pixels to stay under.

use crate::capture::Frame;

/// Fraction of pure-black (0,0,0) pixels in the frame.
pub fn black_ratio(frame: &Frame) -> f32 {
    let total = (frame.width() as u64) * (frame.height() as u64);
    if total == 0 {
        return 0.0;
    }
    let black = frame
        .pixels()
        .filter(|px| px[0] == 0 && px[1] == 0 && px[2] == 0)
        .count() as u64;
    black as f32 / total as f32
}

pub fn is_blanked(frame: &Frame, threshold: f32) -> bool {
    black_ratio(frame) >= threshold
}
