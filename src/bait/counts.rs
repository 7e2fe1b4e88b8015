//! Bait count extraction from OCR fragments.
//!
//! The bait menu lists one rarity per row with a small "xN" count label.
//! Fragments are grouped into rows by vertical proximity, then each row is
//! mined for its count with progressively more desperate strategies: the
//! xN pattern, bare numbers, and finally a re-OCR of just the right-hand
//! band of the row over several image variants with a majority vote.

use image::imageops;
use regex::Regex;
use std::sync::OnceLock;

use super::BaitCounts;
use crate::capture::Frame;
use crate::ocr::adapter::OcrAdapter;
use crate::ocr::{OcrFragment, preprocess};
use crate::vision::classify::Classification;

/// Fragments within this vertical distance of a row's running center are
/// part of the same row.
const LINE_TOLERANCE: f32 = 10.0;

/// Fraction of the menu width, from the right, holding the count labels.
const COUNT_BAND_FRACTION: f32 = 0.35;

fn x_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?:[xX]\s*(\d+)|(\d+)\s*[xX])").expect("valid regex"))
}

fn bare_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b(\d{1,4})\b").expect("valid regex"))
}

/// One horizontal row of recognized fragments, left-to-right.
#[derive(Debug, Clone)]
pub struct LineGroup {
    center_y: f32,
    pub y_min: u32,
    pub y_max: u32,
    fragments: Vec<OcrFragment>,
}

impl LineGroup {
    pub fn text(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Groups fragments into rows by vertical-center proximity, rows sorted
/// top-to-bottom and fragments within a row sorted left-to-right.
pub fn group_lines(mut fragments: Vec<OcrFragment>) -> Vec<LineGroup> {
    fragments.sort_by_key(|f| f.center_y());

    let mut groups: Vec<LineGroup> = Vec::new();
    for fragment in fragments {
        let y = fragment.center_y() as f32;
        let top = fragment.top;
        let bottom = fragment.top + fragment.height;

        match groups.last_mut() {
            Some(group) if (y - group.center_y).abs() <= LINE_TOLERANCE => {
                group.y_min = group.y_min.min(top);
                group.y_max = group.y_max.max(bottom);
                let n = group.fragments.len() as f32;
                group.center_y = (group.center_y * n + y) / (n + 1.0);
                group.fragments.push(fragment);
            }
            _ => groups.push(LineGroup {
                center_y: y,
                y_min: top,
                y_max: bottom,
                fragments: vec![fragment],
            }),
        }
    }

    for group in &mut groups {
        group.fragments.sort_by_key(|f| f.left);
    }
    groups
}

fn x_number_candidates(text: &str, out: &mut Vec<u32>) {
    for caps in x_number_pattern().captures_iter(text) {
        let digits = caps.get(1).or_else(|| caps.get(2));
        if let Some(m) = digits {
            if let Ok(n) = m.as_str().parse::<u32>() {
                out.push(n);
            }
        }
    }
}

fn bare_number_candidates(text: &str, out: &mut Vec<u32>) {
    for caps in bare_number_pattern().captures_iter(text) {
        if let Some(m) = caps.get(1) {
            if let Ok(n) = m.as_str().parse::<u32>() {
                if (1..=9999).contains(&n) {
                    out.push(n);
                }
            }
        }
    }
}

/// Majority vote with 6-vs-9 disambiguation: when exactly two candidates
/// compete and they are a known 6/9 confusion pair, prefer the one that
/// contains a 9. Other ties go to the more frequent, then larger, value.
pub fn pick_best(candidates: &[u32]) -> Option<u32> {
    if candidates.is_empty() {
        return None;
    }

    let mut tallies: Vec<(u32, u32)> = Vec::new();
    for &value in candidates {
        match tallies.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => tallies.push((value, 1)),
        }
    }

    if tallies.len() == 2 {
        let mut values = [tallies[0].0, tallies[1].0];
        values.sort_unstable();
        if values == [6, 9] || values == [60, 90] || values == [16, 19] {
            let winner = tallies
                .iter()
                .map(|(v, _)| *v)
                .find(|v| v.to_string().contains('9'));
            if let Some(winner) = winner {
                crate::log(&format!("Count vote: resolved 6-vs-9 as {}", winner));
                return Some(winner);
            }
        }
    }

    tallies
        .iter()
        .max_by_key(|(value, count)| (*count, *value))
        .map(|(value, _)| *value)
}

/// Extracts the count for one row, escalating from the row's own text to a
/// localized band re-OCR when the first read missed the digits.
pub fn extract_line_count(
    group: &LineGroup,
    frame: &Frame,
    ocr: &mut OcrAdapter,
) -> Option<u32> {
    let mut candidates: Vec<u32> = Vec::new();

    let joined = group.text();
    x_number_candidates(&joined, &mut candidates);
    for fragment in &group.fragments {
        x_number_candidates(&fragment.text, &mut candidates);
    }

    if candidates.is_empty() {
        bare_number_candidates(&joined, &mut candidates);
    }

    if candidates.is_empty() {
        candidates = band_reocr_candidates(group, frame, ocr);
    }

    pick_best(&candidates)
}

/// Re-reads just the right-hand count band of a row over several binarized
/// and upscaled variants of it.
fn band_reocr_candidates(group: &LineGroup, frame: &Frame, ocr: &mut OcrAdapter) -> Vec<u32> {
    let pad = 2u32;
    let y0 = group.y_min.saturating_sub(pad).min(frame.height());
    let y1 = (group.y_max + pad).min(frame.height());
    if y1 <= y0 {
        return Vec::new();
    }

    let row = imageops::crop_imm(frame, 0, y0, frame.width(), y1 - y0).to_image();
    let band = preprocess::crop_right_fraction(&preprocess::to_gray(&row), COUNT_BAND_FRACTION);

    let mut candidates: Vec<u32> = Vec::new();
    for variant in preprocess::band_variants(&band) {
        match ocr.recognize_timeout(variant) {
            Ok(fragments) => {
                let text = fragments
                    .iter()
                    .map(|f| f.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                x_number_candidates(&text, &mut candidates);
                bare_number_candidates(&text, &mut candidates);
            }
            Err(e) => crate::log(&format!("Band re-OCR variant failed: {}", e)),
        }
    }
    candidates
}

fn has_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("legendary") || lower.contains("rare") || lower.contains("common")
}

/// Drops header/decoration rows: a bait row either carries an xN count or
/// names a rarity. Falls back to everything when the filter empties the set.
pub fn filter_bait_lines(groups: Vec<LineGroup>) -> Vec<LineGroup> {
    let filtered: Vec<LineGroup> = groups
        .iter()
        .filter(|g| {
            let text = g.text();
            x_number_pattern().is_match(&text) || has_keyword(&text)
        })
        .cloned()
        .collect();
    if filtered.is_empty() { groups } else { filtered }
}

/// Assembles [`BaitCounts`] from grouped rows.
///
/// Three or more rows map positionally to legendary/rare/common. Exactly two
/// rows are disambiguated by rarity keywords plus the top-zone color hint;
/// `mid_hint` is only invoked when the top row is legendary, so the extra
/// capture and classification are skipped otherwise.
pub fn parse_counts(
    groups: Vec<LineGroup>,
    frame: &Frame,
    ocr: &mut OcrAdapter,
    top_hint: Option<Classification>,
    mid_hint: &mut dyn FnMut() -> Option<Classification>,
) -> BaitCounts {
    let mut counts = BaitCounts::default();
    let lines = filter_bait_lines(groups);

    crate::log(&format!(
        "Bait menu rows: {:?}",
        lines.iter().map(|g| g.text()).collect::<Vec<_>>()
    ));

    if lines.len() >= 3 {
        counts.legendary = extract_line_count(&lines[0], frame, ocr);
        counts.rare = extract_line_count(&lines[1], frame, ocr);
        counts.common = extract_line_count(&lines[2], frame, ocr);
        return counts;
    }

    if lines.len() == 2 {
        let top_text = lines[0].text().to_lowercase();
        let mid_text = lines[1].text().to_lowercase();

        let top_legendary =
            top_text.contains("legendary") || top_hint == Some(Classification::Legendary);
        let top_rare = top_text.contains("rare") || top_hint == Some(Classification::Rare);

        if top_legendary {
            counts.legendary = extract_line_count(&lines[0], frame, ocr);

            let hint = mid_hint();
            if mid_text.contains("rare") || hint == Some(Classification::Rare) {
                counts.rare = extract_line_count(&lines[1], frame, ocr);
            } else if mid_text.contains("common") || hint == Some(Classification::Common) {
                counts.common = extract_line_count(&lines[1], frame, ocr);
            }
        } else if top_rare {
            counts.rare = extract_line_count(&lines[0], frame, ocr);
            counts.common = extract_line_count(&lines[1], frame, ocr);
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::TextRecognizer;
    use crate::testutil::StaticRecognizer;
    use image::{ImageBuffer, Rgba};
    use std::time::Duration;

    fn frag(text: &str, left: u32, top: u32) -> OcrFragment {
        OcrFragment {
            text: text.to_string(),
            left,
            top,
            width: 30,
            height: 12,
        }
    }

    fn frame() -> Frame {
        ImageBuffer::from_pixel(200, 100, Rgba([40, 40, 40, 255]))
    }

    fn adapter_with(fragments: Vec<OcrFragment>) -> OcrAdapter {
        OcrAdapter::new(
            Box::new(StaticRecognizer::new(fragments)),
            Duration::from_millis(500),
        )
    }

    fn empty_adapter() -> OcrAdapter {
        adapter_with(Vec::new())
    }

    fn no_mid_hint() -> impl FnMut() -> Option<Classification> {
        || None
    }

    #[test]
    fn test_group_lines_by_vertical_proximity() {
        let groups = group_lines(vec![
            frag("Legendary", 0, 10),
            frag("x12", 80, 13),
            frag("Rare", 0, 40),
            frag("x3", 80, 42),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].text(), "Legendary x12");
        assert_eq!(groups[1].text(), "Rare x3");
    }

    #[test]
    fn test_group_lines_orders_fragments_by_x() {
        let groups = group_lines(vec![frag("x7", 90, 10), frag("Common", 5, 11)]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].text(), "Common x7");
    }

    #[test]
    fn test_x_pattern_both_orders() {
        let mut out = Vec::new();
        x_number_candidates("Legendary x12", &mut out);
        x_number_candidates("7x bait", &mut out);
        assert_eq!(out, vec![12, 7]);
    }

    #[test]
    fn test_bare_number_range_filter() {
        let mut out = Vec::new();
        bare_number_candidates("lvl 0 count 42 id 10000", &mut out);
        // 0 is out of range; 10000 has five digits and never matches
        assert_eq!(out, vec![42]);
    }

    #[test]
    fn test_pick_best_majority() {
        assert_eq!(pick_best(&[12, 12, 7]), Some(12));
    }

    #[test]
    fn test_pick_best_six_vs_nine_prefers_nine() {
        assert_eq!(pick_best(&[6, 9]), Some(9));
        assert_eq!(pick_best(&[90, 60, 60]), Some(90));
        assert_eq!(pick_best(&[16, 19]), Some(19));
    }

    #[test]
    fn test_pick_best_tie_prefers_larger() {
        assert_eq!(pick_best(&[3, 8]), Some(8));
    }

    #[test]
    fn test_extract_count_from_row_text() {
        let groups = group_lines(vec![frag("Legendary", 0, 10), frag("x12", 80, 10)]);
        let mut ocr = empty_adapter();
        assert_eq!(extract_line_count(&groups[0], &frame(), &mut ocr), Some(12));
    }

    #[test]
    fn test_extract_count_bare_fallback() {
        let groups = group_lines(vec![frag("Rare", 0, 10), frag("34", 80, 10)]);
        let mut ocr = empty_adapter();
        assert_eq!(extract_line_count(&groups[0], &frame(), &mut ocr), Some(34));
    }

    #[test]
    fn test_extract_count_band_reocr() {
        let groups = group_lines(vec![frag("Legendary", 0, 10)]);
        // Every band variant reads "x9", the vote is unanimous
        let mut ocr = adapter_with(vec![frag("x9", 2, 2)]);
        assert_eq!(extract_line_count(&groups[0], &frame(), &mut ocr), Some(9));
    }

    #[test]
    fn test_filter_drops_header_rows() {
        let groups = group_lines(vec![
            frag("Select", 0, 5),
            frag("Bait", 40, 5),
            frag("Legendary", 0, 30),
            frag("x2", 80, 30),
        ]);
        let filtered = filter_bait_lines(groups);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].text(), "Legendary x2");
    }

    #[test]
    fn test_parse_three_lines_positional() {
        let groups = group_lines(vec![
            frag("Legendary", 0, 10),
            frag("x5", 80, 10),
            frag("Rare", 0, 40),
            frag("x12", 80, 40),
            frag("Common", 0, 70),
            frag("x44", 80, 70),
        ]);
        let mut ocr = empty_adapter();
        let counts = parse_counts(groups, &frame(), &mut ocr, None, &mut no_mid_hint());
        assert_eq!(counts.legendary, Some(5));
        assert_eq!(counts.rare, Some(12));
        assert_eq!(counts.common, Some(44));
    }

    #[test]
    fn test_parse_two_lines_with_keywords() {
        let groups = group_lines(vec![
            frag("Legendary", 0, 10),
            frag("x3", 80, 10),
            frag("Rare", 0, 40),
            frag("x9", 80, 40),
        ]);
        let mut ocr = empty_adapter();
        let counts = parse_counts(groups, &frame(), &mut ocr, None, &mut no_mid_hint());
        assert_eq!(counts.legendary, Some(3));
        assert_eq!(counts.rare, Some(9));
        assert_eq!(counts.common, None);
    }

    #[test]
    fn test_parse_two_lines_uses_color_hints() {
        // No keywords at all; the top hint says legendary, the mid hint rare
        let groups = group_lines(vec![
            frag("x3", 80, 10),
            frag("x9", 80, 40),
        ]);
        let mut ocr = empty_adapter();
        let mut mid_calls = 0;
        let counts = parse_counts(
            groups,
            &frame(),
            &mut ocr,
            Some(Classification::Legendary),
            &mut || {
                mid_calls += 1;
                Some(Classification::Rare)
            },
        );
        assert_eq!(counts.legendary, Some(3));
        assert_eq!(counts.rare, Some(9));
        assert_eq!(mid_calls, 1);
    }

    #[test]
    fn test_parse_two_lines_skips_mid_hint_when_top_is_rare() {
        let groups = group_lines(vec![
            frag("Rare", 0, 10),
            frag("x4", 80, 10),
            frag("Common", 0, 40),
            frag("x44", 80, 40),
        ]);
        let mut ocr = empty_adapter();
        let mut mid_calls = 0;
        let counts = parse_counts(groups, &frame(), &mut ocr, None, &mut || {
            mid_calls += 1;
            None
        });
        assert_eq!(counts.rare, Some(4));
        assert_eq!(counts.common, Some(44));
        assert_eq!(mid_calls, 0);
    }

    // Sanity check that the static recognizer is usable for band tests
    #[test]
    fn test_static_recognizer_round_trip() {
        let mut recognizer = StaticRecognizer::new(vec![frag("x9", 0, 0)]);
        let result = recognizer
            .recognize(&image::GrayImage::new(4, 4))
            .expect("recognize");
        assert_eq!(result[0].text, "x9");
    }
}
