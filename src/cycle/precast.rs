//! Pluggable pre-cast stages.
//!
//! Everything between two minigames happens here: restocking bait (shop
//! purchase or crafting), selecting the rod and bait, the alignment cast,
//! the resource pickup check, and the real cast. The orchestrator picks the
//! stage per cycle from the config snapshot.

use std::time::Duration;

use crate::capture::CachedCapture;
use crate::config::{BotConfig, Point};
use crate::events::EventSink;
use crate::input::Actuator;
use crate::ocr::adapter::OcrAdapter;
use crate::timing::{CancelToken, interruptible_sleep};

use super::SessionCounters;

/// Hold time for ordinary UI clicks.
const UI_CLICK_HOLD: Duration = Duration::from_millis(100);

/// How a pre-cast run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    /// Rod is cast, bite scanning can start.
    Done,
    /// Missing configuration or a failed step; retry next loop.
    Failed,
    /// Stop was requested mid-stage.
    Cancelled,
}

/// Everything a pre-cast stage may touch, borrowed from the orchestrator
/// for the duration of one run.
pub struct StageWorld<'a> {
    pub cfg: &'a BotConfig,
    pub capture: &'a mut CachedCapture,
    pub actuator: &'a mut Actuator,
    pub bait: &'a mut crate::bait::BaitEngine,
    pub ocr: Option<&'a mut OcrAdapter>,
    pub events: &'a dyn EventSink,
    pub cancel: &'a CancelToken,
    pub counters: &'a mut SessionCounters,
}

impl StageWorld<'_> {
    /// Interruptible wait; `false` means a stop was requested.
    fn pause(&self, ms: u64) -> bool {
        interruptible_sleep(self.cancel, Duration::from_millis(ms))
    }
}

pub trait PreCastStage: Send {
    fn run(&mut self, world: &mut StageWorld<'_>) -> StageOutcome;
}

/// Normal mode: optional periodic shop purchase, then select, bait, cast.
pub struct NormalPreCast {
    /// Cycles remaining until the next purchase.
    purchase_countdown: u32,
}

impl NormalPreCast {
    pub fn new() -> Self {
        Self { purchase_countdown: 0 }
    }

    /// Runs the shop dialog every `loops_per_purchase` cycles; in between it
    /// just counts down. Missing button coordinates skip purchasing rather
    /// than blocking the cast.
    fn maybe_purchase(&mut self, world: &mut StageWorld<'_>) -> StageOutcome {
        if self.purchase_countdown > 0 {
            self.purchase_countdown -= 1;
            crate::log(&format!(
                "Shop: skipping, {} cycles until next purchase",
                self.purchase_countdown
            ));
            return StageOutcome::Done;
        }

        let shop = &world.cfg.shop;
        let (Some(yes), Some(quantity), Some(no)) =
            (shop.yes_button, shop.quantity_button, shop.no_button)
        else {
            crate::log("Shop: button coordinates not set, skipping purchase");
            return if world.pause(2000) { StageOutcome::Done } else { StageOutcome::Cancelled };
        };

        world.events.on_status("Buying bait");
        crate::log("Shop: starting purchase sequence");
        let step = world.cfg.timing.shop_step_delay_ms;

        world.actuator.tap_key(&world.cfg.keys.interact);
        if !world.pause(step) {
            return StageOutcome::Cancelled;
        }

        for point in [&yes, &quantity] {
            world.actuator.click(point, UI_CLICK_HOLD);
            if !world.pause(step) {
                return StageOutcome::Cancelled;
            }
        }

        // The purchased quantity doubles as the purchase period
        for digit in shop.loops_per_purchase.to_string().chars() {
            world.actuator.tap_key(&digit.to_string());
            if !world.pause(world.cfg.timing.key_tap_delay_ms) {
                return StageOutcome::Cancelled;
            }
        }
        if !world.pause(500) {
            return StageOutcome::Cancelled;
        }

        // Confirm, dismiss the follow-up offer, close the dialog
        for point in [&yes, &no, &quantity] {
            world.actuator.click(point, UI_CLICK_HOLD);
            if !world.pause(step) {
                return StageOutcome::Cancelled;
            }
        }

        self.purchase_countdown = shop.loops_per_purchase;
        crate::log(&format!(
            "Shop: purchase complete, next in {} cycles",
            shop.loops_per_purchase
        ));
        StageOutcome::Done
    }

    /// Resource pickups surface on the previous cast; press the resource
    /// hotkey, probe the configured pixel, and store + drop on a match.
    fn resource_check(&mut self, world: &mut StageWorld<'_>) -> StageOutcome {
        let Some(probe) = world.cfg.resource_point else {
            return StageOutcome::Done;
        };

        world.events.on_status("Checking for resource");
        world.actuator.tap_key(&world.cfg.keys.deselect);
        if !world.pause(world.cfg.timing.rod_deselect_delay_ms) {
            return StageOutcome::Cancelled;
        }
        world.actuator.tap_key(&world.cfg.keys.resource);
        if !world.pause(world.cfg.timing.store_click_delay_ms) {
            return StageOutcome::Cancelled;
        }

        let detected = match world.capture.capture_pixel(&probe) {
            Some((r, g, b)) => world.cfg.palette.resource.matches(r, g, b),
            None => {
                crate::log("Resource check: pixel capture failed");
                false
            }
        };

        if detected {
            world.counters.resources += 1;
            crate::log(&format!("Resource caught, total {}", world.counters.resources));
            world.events.on_resource_caught(world.counters.resources);

            if let Some(store) = world.cfg.store_point {
                world.actuator.click(&store, UI_CLICK_HOLD);
                if !world.pause(world.cfg.timing.store_click_delay_ms) {
                    return StageOutcome::Cancelled;
                }
            }
            world.actuator.tap_key(&world.cfg.keys.drop);
            if !world.pause(world.cfg.timing.rod_deselect_delay_ms) {
                return StageOutcome::Cancelled;
            }
        }

        // The hotkey swapped the held item; the rod must come back either way
        match select_rod_and_bait(world) {
            StageOutcome::Done => StageOutcome::Done,
            other => other,
        }
    }
}

impl PreCastStage for NormalPreCast {
    fn run(&mut self, world: &mut StageWorld<'_>) -> StageOutcome {
        if world.cfg.shop.enabled {
            match self.maybe_purchase(world) {
                StageOutcome::Done => {}
                other => return other,
            }
        }

        match select_rod_and_bait(world) {
            StageOutcome::Done => {}
            other => return other,
        }

        // Alignment cast settles the avatar's facing before the real cast
        world.events.on_status("Casting (alignment)");
        match cast(world) {
            StageOutcome::Done => {}
            other => return other,
        }
        if !world.pause(300) {
            return StageOutcome::Cancelled;
        }

        match self.resource_check(world) {
            StageOutcome::Done => {}
            other => return other,
        }

        world.events.on_status("Casting");
        match cast(world) {
            StageOutcome::Done => {}
            other => return other,
        }

        if !world.pause(world.cfg.timing.minigame_wait_ms) {
            return StageOutcome::Cancelled;
        }
        StageOutcome::Done
    }
}

/// Auto-craft mode: craft bait from caught fish on a cadence, then cast.
pub struct AutoCraftPreCast {
    /// Fish total at the last completed craft, so a failed cast at the same
    /// count doesn't craft twice.
    last_craft_fish: Option<u64>,
}

impl AutoCraftPreCast {
    pub fn new() -> Self {
        Self { last_craft_fish: None }
    }

    fn should_craft(&self, every_n: u32, fish: u64) -> bool {
        if every_n == 0 {
            return true;
        }
        let at_cadence = fish == 0 || fish % u64::from(every_n) == 0;
        at_cadence && self.last_craft_fish != Some(fish)
    }

    /// Fixed Common -> Rare -> Legendary order; per kind: icon, plus, fish,
    /// then the craft button once per unit.
    fn run_craft(&mut self, world: &mut StageWorld<'_>) -> StageOutcome {
        let craft = &world.cfg.craft;
        world.events.on_status("Crafting bait");

        world.actuator.tap_key(&world.cfg.keys.rod);
        if !world.pause(world.cfg.timing.rod_select_delay_ms) {
            return StageOutcome::Cancelled;
        }
        // Menu open delay
        if !world.pause(craft.step_delay_ms) {
            return StageOutcome::Cancelled;
        }

        let (Some(plus), Some(fish_button), Some(craft_button)) =
            (craft.plus_button, craft.fish_button, craft.craft_button)
        else {
            crate::log("Craft: shared button coordinates not set, skipping");
            return StageOutcome::Done;
        };

        let kinds: [(&str, Option<Point>, u32); 3] = [
            ("common", craft.common_icon, craft.common_quantity),
            ("rare", craft.rare_icon, craft.rare_quantity),
            ("legendary", craft.legendary_icon, craft.legendary_quantity),
        ];

        for (name, icon, quantity) in kinds {
            if quantity == 0 {
                continue;
            }
            let Some(icon) = icon else {
                crate::log(&format!("Craft: {} icon not set, skipping", name));
                continue;
            };

            crate::log(&format!("Craft: {}x {}", quantity, name));
            for point in [&icon, &plus, &fish_button] {
                world.actuator.click(point, UI_CLICK_HOLD);
                if !world.pause(craft.step_delay_ms) {
                    return StageOutcome::Cancelled;
                }
            }
            for _ in 0..quantity {
                world.actuator.click(&craft_button, UI_CLICK_HOLD);
                if !world.pause(craft.step_delay_ms) {
                    return StageOutcome::Cancelled;
                }
            }
        }

        self.last_craft_fish = Some(world.counters.fish);
        crate::log("Craft: sequence complete");
        StageOutcome::Done
    }
}

impl PreCastStage for AutoCraftPreCast {
    fn run(&mut self, world: &mut StageWorld<'_>) -> StageOutcome {
        if self.should_craft(world.cfg.craft.craft_every_n_fish, world.counters.fish) {
            match self.run_craft(world) {
                StageOutcome::Done => {}
                other => return other,
            }
        }

        match select_rod_and_bait(world) {
            StageOutcome::Done => {}
            other => return other,
        }

        world.events.on_status("Casting");
        match cast(world) {
            StageOutcome::Done => {}
            other => return other,
        }

        if !world.pause(world.cfg.timing.minigame_wait_ms) {
            return StageOutcome::Cancelled;
        }
        StageOutcome::Done
    }
}

/// Deselect, select the rod, then click the slot the bait engine picked.
fn select_rod_and_bait(world: &mut StageWorld<'_>) -> StageOutcome {
    world.actuator.tap_key(&world.cfg.keys.deselect);
    if !world.pause(world.cfg.timing.rod_deselect_delay_ms) {
        return StageOutcome::Cancelled;
    }
    world.actuator.tap_key(&world.cfg.keys.rod);
    if !world.pause(world.cfg.timing.rod_select_delay_ms) {
        return StageOutcome::Cancelled;
    }

    let slot = world.bait.select_bait(
        &world.cfg.bait,
        world.capture,
        world.ocr.as_deref_mut(),
        world.events,
    );
    if let Some(slot) = slot {
        world.actuator.click(&slot, UI_CLICK_HOLD);
        if !world.pause(world.cfg.timing.bait_click_delay_ms) {
            return StageOutcome::Cancelled;
        }
    }
    StageOutcome::Done
}

/// Casts toward the configured water point.
fn cast(world: &mut StageWorld<'_>) -> StageOutcome {
    let Some(water) = world.cfg.water_point else {
        crate::log("Cast: no water point configured");
        if !world.pause(1000) {
            return StageOutcome::Cancelled;
        }
        return StageOutcome::Failed;
    };

    world.actuator.click(
        &water,
        Duration::from_millis(world.cfg.timing.cast_hold_ms),
    );
    if !world.pause(world.cfg.timing.bait_click_delay_ms) {
        return StageOutcome::Cancelled;
    }
    StageOutcome::Done
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bait::{BaitEngine, BaitMode};
    use crate::capture::Frame;
    use crate::config::{Point, ShopConfig, TimingConfig};
    use crate::testutil::{ActuationEvent, CollectingEvents, RecordingActuation, ScriptedCapture};
    use image::{ImageBuffer, Rgba};

    fn fast_timing() -> TimingConfig {
        TimingConfig {
            rod_deselect_delay_ms: 1,
            rod_select_delay_ms: 1,
            bait_click_delay_ms: 1,
            cast_hold_ms: 1,
            minigame_wait_ms: 1,
            store_click_delay_ms: 1,
            shop_step_delay_ms: 1,
            key_tap_delay_ms: 1,
        }
    }

    fn base_config() -> BotConfig {
        BotConfig {
            timing: fast_timing(),
            water_point: Some(Point { x: 500, y: 400 }),
            ..BotConfig::default()
        }
    }

    struct Harness {
        cfg: BotConfig,
        capture: CachedCapture,
        actuator: Actuator,
        bait: BaitEngine,
        events: CollectingEvents,
        cancel: CancelToken,
        counters: SessionCounters,
        log: std::sync::Arc<std::sync::Mutex<Vec<ActuationEvent>>>,
    }

    impl Harness {
        fn new(cfg: BotConfig, frames: Vec<Option<Frame>>) -> Self {
            let recording = RecordingActuation::new();
            let log = recording.events();
            Self {
                cfg,
                capture: CachedCapture::new(
                    Box::new(ScriptedCapture::new(frames)),
                    Duration::from_millis(16),
                ),
                actuator: Actuator::new(Box::new(recording)),
                bait: BaitEngine::new(BaitMode::Stockpile, Box::new(|_| {})),
                events: CollectingEvents::new(),
                cancel: CancelToken::new(),
                counters: SessionCounters::new(),
                log,
            }
        }

        fn run(&mut self, stage: &mut dyn PreCastStage) -> StageOutcome {
            let mut world = StageWorld {
                cfg: &self.cfg,
                capture: &mut self.capture,
                actuator: &mut self.actuator,
                bait: &mut self.bait,
                ocr: None,
                events: &self.events,
                cancel: &self.cancel,
                counters: &mut self.counters,
            };
            stage.run(&mut world)
        }

        fn action_log(&self) -> Vec<ActuationEvent> {
            self.log.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_normal_precast_selects_and_casts() {
        let mut harness = Harness::new(base_config(), vec![]);
        let mut stage = NormalPreCast::new();

        assert_eq!(harness.run(&mut stage), StageOutcome::Done);

        let log = harness.action_log();
        assert_eq!(log[0], ActuationEvent::TapKey("2".to_string()));
        assert_eq!(log[1], ActuationEvent::TapKey("1".to_string()));
        // Alignment cast and real cast both land on the water point
        let casts: Vec<_> = log
            .iter()
            .filter(|e| **e == ActuationEvent::Click(500, 400))
            .collect();
        assert_eq!(casts.len(), 2);
    }

    #[test]
    fn test_missing_water_point_fails() {
        let mut cfg = base_config();
        cfg.water_point = None;
        let mut harness = Harness::new(cfg, vec![]);
        let mut stage = NormalPreCast::new();

        assert_eq!(harness.run(&mut stage), StageOutcome::Failed);
    }

    #[test]
    fn test_cancel_mid_stage() {
        let mut harness = Harness::new(base_config(), vec![]);
        harness.cancel.cancel();
        let mut stage = NormalPreCast::new();

        assert_eq!(harness.run(&mut stage), StageOutcome::Cancelled);
    }

    #[test]
    fn test_shop_purchase_then_countdown() {
        let mut cfg = base_config();
        cfg.shop = ShopConfig {
            enabled: true,
            loops_per_purchase: 3,
            yes_button: Some(Point { x: 10, y: 10 }),
            quantity_button: Some(Point { x: 20, y: 20 }),
            no_button: Some(Point { x: 30, y: 30 }),
        };
        let mut harness = Harness::new(cfg, vec![]);
        let mut stage = NormalPreCast::new();

        // First run purchases: interact key plus the typed quantity
        assert_eq!(harness.run(&mut stage), StageOutcome::Done);
        let log = harness.action_log();
        assert!(log.contains(&ActuationEvent::TapKey("e".to_string())));
        assert!(log.contains(&ActuationEvent::TapKey("3".to_string())));
        assert_eq!(stage.purchase_countdown, 3);

        // Next run only counts down
        let before = harness.action_log().len();
        assert_eq!(harness.run(&mut stage), StageOutcome::Done);
        let log = harness.action_log();
        assert!(!log[before..].contains(&ActuationEvent::TapKey("e".to_string())));
        assert_eq!(stage.purchase_countdown, 2);
    }

    #[test]
    fn test_resource_detected_stores_and_drops() {
        let mut cfg = base_config();
        cfg.resource_point = Some(Point { x: 50, y: 60 });
        cfg.store_point = Some(Point { x: 70, y: 80 });

        // The 1x1 pixel probe reads the resource color
        let resource_px: Frame = ImageBuffer::from_pixel(1, 1, Rgba([255, 85, 127, 255]));
        let mut harness = Harness::new(cfg, vec![Some(resource_px)]);
        let mut stage = NormalPreCast::new();

        assert_eq!(harness.run(&mut stage), StageOutcome::Done);
        assert_eq!(harness.counters.resources, 1);
        assert_eq!(harness.events.resource_totals(), vec![1]);

        let log = harness.action_log();
        assert!(log.contains(&ActuationEvent::TapKey("3".to_string())));
        assert!(log.contains(&ActuationEvent::Click(70, 80)));
        assert!(log.contains(&ActuationEvent::TapKey("backspace".to_string())));
    }

    #[test]
    fn test_resource_absent_skips_store() {
        let mut cfg = base_config();
        cfg.resource_point = Some(Point { x: 50, y: 60 });
        cfg.store_point = Some(Point { x: 70, y: 80 });

        let plain_px: Frame = ImageBuffer::from_pixel(1, 1, Rgba([10, 200, 30, 255]));
        let mut harness = Harness::new(cfg, vec![Some(plain_px)]);
        let mut stage = NormalPreCast::new();

        assert_eq!(harness.run(&mut stage), StageOutcome::Done);
        assert_eq!(harness.counters.resources, 0);
        assert!(!harness.action_log().contains(&ActuationEvent::Click(70, 80)));
    }

    fn craft_config() -> BotConfig {
        let mut cfg = base_config();
        cfg.craft.enabled = true;
        cfg.craft.craft_every_n_fish = 2;
        cfg.craft.step_delay_ms = 1;
        cfg.craft.common_icon = Some(Point { x: 1, y: 1 });
        cfg.craft.rare_icon = Some(Point { x: 2, y: 2 });
        cfg.craft.legendary_icon = Some(Point { x: 3, y: 3 });
        cfg.craft.plus_button = Some(Point { x: 4, y: 4 });
        cfg.craft.fish_button = Some(Point { x: 5, y: 5 });
        cfg.craft.craft_button = Some(Point { x: 6, y: 6 });
        cfg
    }

    #[test]
    fn test_craft_order_and_quantities() {
        let mut cfg = craft_config();
        cfg.craft.common_quantity = 2;
        cfg.craft.rare_quantity = 1;
        cfg.craft.legendary_quantity = 0;
        let mut harness = Harness::new(cfg, vec![]);
        let mut stage = AutoCraftPreCast::new();

        assert_eq!(harness.run(&mut stage), StageOutcome::Done);
        let clicks: Vec<_> = harness
            .action_log()
            .into_iter()
            .filter(|e| matches!(e, ActuationEvent::Click(x, _) if *x <= 6))
            .collect();
        // Common: icon, plus, fish, craft x2; Rare: icon, plus, fish, craft;
        // Legendary skipped at quantity 0
        assert_eq!(
            clicks,
            vec![
                ActuationEvent::Click(1, 1),
                ActuationEvent::Click(4, 4),
                ActuationEvent::Click(5, 5),
                ActuationEvent::Click(6, 6),
                ActuationEvent::Click(6, 6),
                ActuationEvent::Click(2, 2),
                ActuationEvent::Click(4, 4),
                ActuationEvent::Click(5, 5),
                ActuationEvent::Click(6, 6),
            ]
        );
    }

    #[test]
    fn test_craft_latch_prevents_recraft_at_same_count() {
        let stage = AutoCraftPreCast { last_craft_fish: Some(0) };
        assert!(!stage.should_craft(2, 0));
        assert!(stage.should_craft(2, 2));
        assert!(!stage.should_craft(2, 3));
    }

    #[test]
    fn test_craft_every_cast_when_cadence_zero() {
        let stage = AutoCraftPreCast { last_craft_fish: Some(5) };
        assert!(stage.should_craft(0, 5));
    }

    #[test]
    fn test_craft_runs_then_latches() {
        let mut harness = Harness::new(craft_config(), vec![]);
        let mut stage = AutoCraftPreCast::new();

        assert_eq!(harness.run(&mut stage), StageOutcome::Done);
        assert_eq!(stage.last_craft_fish, Some(0));

        // Same fish count again: rod tap for the craft menu must not repeat
        let before = harness.action_log().len();
        assert_eq!(harness.run(&mut stage), StageOutcome::Done);
        let log = harness.action_log();
        let rod_taps = log[before..]
            .iter()
            .filter(|e| **e == ActuationEvent::TapKey("1".to_string()))
            .count();
        // Only the select_rod_and_bait tap, not the craft menu tap
        assert_eq!(rod_taps, 1);
    }
}
