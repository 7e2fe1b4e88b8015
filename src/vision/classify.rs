//! Bait rarity classification from slot swatch colors.
//!
//! Rarities are told apart by hue statistics: legendary baits animate a
//! rainbow gradient (high circular hue variance), rares are a solid blue,
//! commons are drab. One classifier, parameterized by a profile; the rule
//! order matters because a legendary gradient contains blue and would
//! otherwise read as rare.

use serde::{Deserialize, Serialize};

use crate::capture::Frame;

/// Rarity of a bait slot as judged from its swatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Legendary,
    Rare,
    Common,
    Unknown,
}

/// Tunable cutoffs for the classifier. Defaults match the reference palette;
/// hosts can retune per game skin without code changes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ClassifyProfile {
    /// Circular hue variance at or above which a swatch is a rainbow.
    #[serde(default = "default_rainbow_variance")]
    pub rainbow_variance: f32,
    /// Vivid-legendary rule: mean saturation above this...
    #[serde(default = "default_vivid_saturation")]
    pub vivid_saturation: f32,
    /// ...combined with at least this much variance.
    #[serde(default = "default_vivid_variance")]
    pub vivid_variance: f32,
    /// Below this variance the swatch is a solid color (common).
    #[serde(default = "default_solid_variance")]
    pub solid_variance: f32,
    /// Dull-common rule: variance below this...
    #[serde(default = "default_dull_variance")]
    pub dull_variance: f32,
    /// ...with mean saturation below this.
    #[serde(default = "default_dull_saturation")]
    pub dull_saturation: f32,
    /// Dominant-hue band counted as blue, in degrees.
    #[serde(default = "default_blue_hue_min")]
    pub blue_hue_min: f32,
    #[serde(default = "default_blue_hue_max")]
    pub blue_hue_max: f32,
    /// Blue-rare rule also requires this much saturation...
    #[serde(default = "default_blue_saturation")]
    pub blue_saturation: f32,
    /// ...and variance below this, to exclude rainbow gradients.
    #[serde(default = "default_blue_variance_max")]
    pub blue_variance_max: f32,
    /// Pixels below these saturation/value floors are background and ignored
    /// unless nothing survives the mask.
    #[serde(default = "default_mask_floor")]
    pub mask_saturation: f32,
    #[serde(default = "default_mask_floor")]
    pub mask_value: f32,
}

fn default_rainbow_variance() -> f32 {
    0.75
}

fn default_vivid_saturation() -> f32 {
    0.70
}

fn default_vivid_variance() -> f32 {
    0.35
}

fn default_solid_variance() -> f32 {
    0.15
}

fn default_dull_variance() -> f32 {
    0.30
}

fn default_dull_saturation() -> f32 {
    0.40
}

fn default_blue_hue_min() -> f32 {
    170.0
}

fn default_blue_hue_max() -> f32 {
    310.0
}

fn default_blue_saturation() -> f32 {
    0.25
}

fn default_blue_variance_max() -> f32 {
    0.70
}

fn default_mask_floor() -> f32 {
    0.2
}

impl Default for ClassifyProfile {
    fn default() -> Self {
        Self {
            rainbow_variance: default_rainbow_variance(),
            vivid_saturation: default_vivid_saturation(),
            vivid_variance: default_vivid_variance(),
            solid_variance: default_solid_variance(),
            dull_variance: default_dull_variance(),
            dull_saturation: default_dull_saturation(),
            blue_hue_min: default_blue_hue_min(),
            blue_hue_max: default_blue_hue_max(),
            blue_saturation: default_blue_saturation(),
            blue_variance_max: default_blue_variance_max(),
            mask_saturation: default_mask_floor(),
            mask_value: default_mask_floor(),
        }
    }
}

/// Hue statistics of the foreground pixels of a swatch.
#[derive(Debug)]
struct HueStats {
    /// Circular variance in [0, 1]: 0 = single hue, 1 = hues spread evenly.
    variance: f32,
    saturation_mean: f32,
    /// Center of the most populated 10-degree hue bin.
    dominant_hue: f32,
}

/// (hue degrees 0..360, saturation 0..1, value 0..1)
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };
    (hue, saturation, max)
}

fn hue_stats(frame: &Frame, profile: &ClassifyProfile) -> Option<HueStats> {
    let mut all: Vec<(f32, f32)> = Vec::with_capacity((frame.width() * frame.height()) as usize);
    let mut fg: Vec<(f32, f32)> = Vec::new();
    for px in frame.pixels() {
        let (h, s, v) = rgb_to_hsv(px[0], px[1], px[2]);
        all.push((h, s));
        if s > profile.mask_saturation && v > profile.mask_value {
            fg.push((h, s));
        }
    }
    if all.is_empty() {
        return None;
    }
    let pixels = if fg.is_empty() { &all } else { &fg };

    let mut sum_cos = 0.0f64;
    let mut sum_sin = 0.0f64;
    let mut sum_sat = 0.0f64;
    let mut bins = [0u32; 36];
    for &(h, s) in pixels.iter() {
        let rad = (h as f64).to_radians();
        sum_cos += rad.cos();
        sum_sin += rad.sin();
        sum_sat += s as f64;
        let bin = ((h / 10.0) as usize).min(35);
        bins[bin] += 1;
    }
    let n = pixels.len() as f64;
    let resultant = ((sum_cos / n).powi(2) + (sum_sin / n).powi(2)).sqrt();
    let dom_bin = bins
        .iter()
        .enumerate()
        .max_by_key(|&(_, &count)| count)
        .map(|(i, _)| i)
        .unwrap_or(0);

    Some(HueStats {
        variance: (1.0 - resultant) as f32,
        saturation_mean: (sum_sat / n) as f32,
        dominant_hue: dom_bin as f32 * 10.0 + 5.0,
    })
}

/// Classifies a bait slot swatch. Rules are evaluated strictly in priority
/// order; reordering them breaks rainbow-vs-blue disambiguation.
pub fn classify(frame: &Frame, profile: &ClassifyProfile) -> Classification {
    let Some(stats) = hue_stats(frame, profile) else {
        return Classification::Unknown;
    };

    crate::log(&format!(
        "Classify: hue_var={:.3} sat_mean={:.3} dom_hue={:.1}",
        stats.variance, stats.saturation_mean, stats.dominant_hue
    ));

    if stats.variance >= profile.rainbow_variance {
        return Classification::Legendary;
    }
    if stats.saturation_mean > profile.vivid_saturation && stats.variance >= profile.vivid_variance
    {
        return Classification::Legendary;
    }
    if stats.variance < profile.solid_variance {
        return Classification::Common;
    }
    if stats.variance < profile.dull_variance && stats.saturation_mean < profile.dull_saturation {
        return Classification::Common;
    }
    if stats.dominant_hue >= profile.blue_hue_min
        && stats.dominant_hue <= profile.blue_hue_max
        && stats.saturation_mean >= profile.blue_saturation
        && stats.variance < profile.blue_variance_max
    {
        return Classification::Rare;
    }
    Classification::Unknown
}
