//! Color matching primitives over captured frames.
//!
//! All positions are in frame-local pixels. Tolerances come from the
//! [`ColorSample`] being matched.

use crate::capture::Frame;
use crate::config::ColorSample;

/// Returns the mean X of all pixels matching `sample`, if any match.
pub fn find_color_mean_x(frame: &Frame, sample: &ColorSample) -> Option<u32> {
    let mut sum: u64 = 0;
    let mut count: u64 = 0;
    for (x, _y, px) in frame.enumerate_pixels() {
        if sample.matches(px[0], px[1], px[2]) {
            sum += x as u64;
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some((sum / count) as u32)
    }
}

/// True if any pixel in the frame matches `sample`.
pub fn contains_color(frame: &Frame, sample: &ColorSample) -> bool {
    frame
        .pixels()
        .any(|px| sample.matches(px[0], px[1], px[2]))
}

/// Topmost and bottommost matching Y in a single column.
pub fn column_color_bounds(frame: &Frame, x: u32, sample: &ColorSample) -> Option<(u32, u32)> {
    if x >= frame.width() {
        return None;
    }
    let mut top = None;
    let mut bottom = None;
    for y in 0..frame.height() {
        let px = frame.get_pixel(x, y);
        if sample.matches(px[0], px[1], px[2]) {
            if top.is_none() {
                top = Some(y);
            }
            bottom = Some(y);
        }
    }
    Some((top?, bottom?))
}

/// Like [`column_color_bounds`] but restricted to `y_top..=y_bottom`.
/// Returned coordinates are absolute frame Ys.
pub fn column_color_bounds_in_span(
    frame: &Frame,
    x: u32,
    y_top: u32,
    y_bottom: u32,
    sample: &ColorSample,
) -> Option<(u32, u32)> {
    if x >= frame.width() || y_top > y_bottom {
        return None;
    }
    let y_end = y_bottom.min(frame.height().saturating_sub(1));
    let mut top = None;
    let mut bottom = None;
    for y in y_top..=y_end {
        let px = frame.get_pixel(x, y);
        if sample.matches(px[0], px[1], px[2]) {
            if top.is_none() {
                top = Some(y);
            }
            bottom = Some(y);
        }
    }
    Some((top?, bottom?))
}

/// Center of the largest gap-merged run of matching pixels in one column,
/// restricted to `y_top..=y_bottom`.
///
/// Matching Ys whose spacing is at most `max_gap` belong to the same run;
/// the largest run is the one with the most matching pixels and its center
/// is the mean of its member Ys (absolute frame coordinate).
pub fn largest_run_center(
    frame: &Frame,
    x: u32,
    y_top: u32,
    y_bottom: u32,
    sample: &ColorSample,
    max_gap: u32,
) -> Option<u32> {
    if x >= frame.width() || y_top > y_bottom {
        return None;
    }
    let y_end = y_bottom.min(frame.height().saturating_sub(1));

    let mut matches: Vec<u32> = Vec::new();
    for y in y_top..=y_end {
        let px = frame.get_pixel(x, y);
        if sample.matches(px[0], px[1], px[2]) {
            matches.push(y);
        }
    }
    if matches.is_empty() {
        return None;
    }

    // Split into runs at gaps larger than max_gap, keep the most populous
    let mut best_start = 0usize;
    let mut best_len = 0usize;
    let mut run_start = 0usize;
    for i in 1..=matches.len() {
        let run_ended = i == matches.len() || matches[i] - matches[i - 1] > max_gap;
        if run_ended {
            let len = i - run_start;
            if len > best_len {
                best_len = len;
                best_start = run_start;
            }
            run_start = i;
        }
    }

    let run = &matches[best_start..best_start + best_len];
    let sum: u64 = run.iter().map(|&y| y as u64).sum();
    Some((sum / run.len() as u64) as u32)
}
