//! Bait selection: which slot to click before each cast.
//!
//! Two strategies share one mode machine. Burning spends legendary bait
//! while it lasts; Stockpile conserves it on rare bait until a target count
//! accumulates. The OCR strategy reads actual counts from the bait menu;
//! the color-only strategy just watches the top slot's rarity swatch.

pub mod counts;

use std::fmt;
use std::time::{Duration, Instant};

use crate::capture::CachedCapture;
use crate::config::{BaitConfig, Point, ScanZone};
use crate::events::EventSink;
use crate::ocr::adapter::OcrAdapter;
use crate::vision::classify::{self, Classification};

/// Classification results for the top slot stay valid this long.
const CLASSIFY_CACHE_TTL: Duration = Duration::from_secs(2);

/// Bait consumption strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaitMode {
    /// Spend legendary bait while more than one remains.
    Burning,
    /// Conserve legendary bait on rares until the target count is reached.
    Stockpile,
}

impl fmt::Display for BaitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaitMode::Burning => write!(f, "Burning"),
            BaitMode::Stockpile => write!(f, "Stockpile"),
        }
    }
}

/// Counts read from the bait menu. `None` means the row could not be read
/// with confidence, which is not the same as zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BaitCounts {
    pub legendary: Option<u32>,
    pub rare: Option<u32>,
    pub common: Option<u32>,
}

/// What the mode machine decided to use this cast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaitChoice {
    Legendary,
    Rare,
    /// No usable counts; click the configured fallback slot.
    Fallback,
}

/// The bait decision engine. Owns the mode; the host observes it through
/// [`BaitEngine::mode`] and resets it with [`BaitEngine::set_mode`].
pub struct BaitEngine {
    mode: BaitMode,
    persist: Box<dyn Fn(BaitMode) + Send>,
    top_cache: Option<(Classification, Instant)>,
}

impl BaitEngine {
    /// `persist` is invoked on every mode transition so the host can save
    /// the new mode across sessions.
    pub fn new(mode: BaitMode, persist: Box<dyn Fn(BaitMode) + Send>) -> Self {
        Self {
            mode,
            persist,
            top_cache: None,
        }
    }

    pub fn mode(&self) -> BaitMode {
        self.mode
    }

    /// Explicit host reset. This is the only way back to Burning after a
    /// color-only auto-switch.
    pub fn set_mode(&mut self, mode: BaitMode, events: &dyn EventSink) {
        if mode != self.mode {
            self.transition(mode, events);
        }
    }

    fn transition(&mut self, mode: BaitMode, events: &dyn EventSink) {
        crate::log(&format!("Bait mode: {} -> {}", self.mode, mode));
        self.mode = mode;
        (self.persist)(mode);
        events.on_mode_changed(mode);
    }

    /// Picks the slot to click for the next cast, or `None` when nothing is
    /// configured or selectable.
    pub fn select_bait(
        &mut self,
        cfg: &BaitConfig,
        capture: &mut CachedCapture,
        ocr: Option<&mut OcrAdapter>,
        events: &dyn EventSink,
    ) -> Option<Point> {
        if cfg.use_ocr {
            self.select_ocr(cfg, capture, ocr, events)
        } else {
            self.select_color_only(cfg, capture, events)
        }
    }

    fn select_ocr(
        &mut self,
        cfg: &BaitConfig,
        capture: &mut CachedCapture,
        ocr: Option<&mut OcrAdapter>,
        events: &dyn EventSink,
    ) -> Option<Point> {
        let (Some(menu_zone), Some(_), Some(_)) = (cfg.menu_zone, cfg.top_zone, cfg.mid_zone)
        else {
            crate::log("Bait OCR: menu, top and mid zones must all be configured");
            return None;
        };
        let Some(ocr) = ocr else {
            crate::log("Bait OCR: no recognizer available, using fallback");
            return self.fallback_point(cfg);
        };

        let counts = match capture.capture(&menu_zone, true) {
            Some(frame) => match ocr.read_fragments(&frame) {
                Some(fragments) => {
                    let groups = counts::group_lines(fragments);
                    let top_hint = self.classify_top(cfg, capture);
                    let mid_zone = cfg.mid_zone;
                    let classify = cfg.classify;
                    let mut mid_hint = || {
                        mid_zone.and_then(|zone| {
                            classify_zone(capture_fresh(capture, &zone)?, &classify)
                        })
                    };
                    counts::parse_counts(groups, &frame, ocr, top_hint, &mut mid_hint)
                }
                None => {
                    crate::log("Bait OCR: no text recognized");
                    BaitCounts::default()
                }
            },
            None => {
                crate::log("Bait OCR: menu capture failed");
                BaitCounts::default()
            }
        };

        match self.decide(&counts, cfg.legendary_target, events) {
            BaitChoice::Legendary => cfg.primary_slot.or_else(|| self.fallback_point(cfg)),
            BaitChoice::Rare => cfg.secondary_slot.or_else(|| self.fallback_point(cfg)),
            BaitChoice::Fallback => self.fallback_point(cfg),
        }
    }

    fn select_color_only(
        &mut self,
        cfg: &BaitConfig,
        capture: &mut CachedCapture,
        events: &dyn EventSink,
    ) -> Option<Point> {
        match self.mode {
            BaitMode::Burning => {
                let classification = self.classify_top(cfg, capture);
                if classification == Some(Classification::Legendary) {
                    events.on_decision_explained("Legendary on top slot, burning it");
                    return cfg.primary_slot.or(cfg.fallback_slot);
                }

                // One-way: only an explicit set_mode returns to Burning
                events.on_decision_explained(
                    "Top slot no longer legendary, switching to Stockpile",
                );
                self.transition(BaitMode::Stockpile, events);
                cfg.secondary_slot.or_else(|| self.fallback_point(cfg))
            }
            // Always the secondary slot; re-classifying would cost a capture
            // for an answer that cannot change the choice
            BaitMode::Stockpile => cfg.secondary_slot.or_else(|| self.fallback_point(cfg)),
        }
    }

    /// The mode machine. Mode transitions fire persistence and host events;
    /// the returned choice is for this tick.
    pub fn decide(
        &mut self,
        counts: &BaitCounts,
        legendary_target: u32,
        events: &dyn EventSink,
    ) -> BaitChoice {
        crate::log(&format!(
            "Bait decision: mode={} legendary={:?} rare={:?} target={}",
            self.mode, counts.legendary, counts.rare, legendary_target
        ));

        match self.mode {
            BaitMode::Burning => match counts.legendary {
                Some(n) if n > 1 => {
                    events.on_decision_explained(&format!("Burning legendary ({} left)", n));
                    BaitChoice::Legendary
                }
                Some(1) => {
                    events.on_decision_explained("Last legendary, switching to Stockpile");
                    self.transition(BaitMode::Stockpile, events);
                    if counts.rare.is_some_and(|r| r > 0) {
                        BaitChoice::Rare
                    } else {
                        BaitChoice::Fallback
                    }
                }
                _ => {
                    if counts.rare.is_some_and(|r| r > 0) {
                        events.on_decision_explained("No legendary, using rare");
                        BaitChoice::Rare
                    } else {
                        events.on_decision_explained("No readable bait counts");
                        BaitChoice::Fallback
                    }
                }
            },
            BaitMode::Stockpile => {
                let Some(legendary) = counts.legendary else {
                    events.on_decision_explained("Legendary count unreadable");
                    return BaitChoice::Fallback;
                };

                if legendary >= legendary_target {
                    events.on_decision_explained(&format!(
                        "Target reached ({}/{}), switching to Burning",
                        legendary, legendary_target
                    ));
                    self.transition(BaitMode::Burning, events);
                    return if legendary > 1 {
                        BaitChoice::Legendary
                    } else {
                        BaitChoice::Fallback
                    };
                }

                if counts.rare.is_some_and(|r| r > 0) {
                    events.on_decision_explained(&format!(
                        "Stockpiling ({}/{}), using rare",
                        legendary, legendary_target
                    ));
                    return BaitChoice::Rare;
                }

                if legendary > 0 {
                    crate::log(&format!(
                        "Stockpile has no rare bait, forced to spend legendary ({}/{})",
                        legendary, legendary_target
                    ));
                    events.on_decision_explained("No rare left, forced legendary");
                    return BaitChoice::Legendary;
                }

                events.on_decision_explained("No baits available");
                BaitChoice::Fallback
            }
        }
    }

    fn fallback_point(&self, cfg: &BaitConfig) -> Option<Point> {
        cfg.fallback_slot.or(cfg.primary_slot)
    }

    /// Classifies the top slot swatch, serving a cached answer when recent.
    fn classify_top(
        &mut self,
        cfg: &BaitConfig,
        capture: &mut CachedCapture,
    ) -> Option<Classification> {
        if let Some((classification, at)) = self.top_cache {
            if at.elapsed() < CLASSIFY_CACHE_TTL {
                return Some(classification);
            }
        }

        let zone = cfg.top_zone?;
        let frame = capture_fresh(capture, &zone)?;
        let classification = classify_zone(frame, &cfg.classify)?;
        self.top_cache = Some((classification, Instant::now()));
        Some(classification)
    }
}

fn capture_fresh(capture: &mut CachedCapture, zone: &ScanZone) -> Option<crate::capture::Frame> {
    capture.capture(zone, true)
}

fn classify_zone(
    frame: crate::capture::Frame,
    profile: &classify::ClassifyProfile,
) -> Option<Classification> {
    Some(classify::classify(&frame, profile))
}
