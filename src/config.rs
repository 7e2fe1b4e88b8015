//! Configuration types for the fishing bot.
//!
//! Loads settings from a JSON file or starts from defaults. The worker thread
//! takes an immutable snapshot at the start of every cycle; host edits are
//! applied as patches between cycles, never mid-cycle.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::vision::classify::ClassifyProfile;

/// A rectangle in absolute screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanZone {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// An absolute screen point, used for click targets.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// A reference color with an optional per-channel tolerance (default exact).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorSample {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default)]
    pub tolerance: Option<u8>,
}

impl ColorSample {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, tolerance: None }
    }

    pub fn with_tolerance(r: u8, g: u8, b: u8, tolerance: u8) -> Self {
        Self { r, g, b, tolerance: Some(tolerance) }
    }

    /// Channelwise comparison within the sample's tolerance.
    pub fn matches(&self, r: u8, g: u8, b: u8) -> bool {
        let tol = self.tolerance.unwrap_or(0) as i16;
        (r as i16 - self.r as i16).abs() <= tol
            && (g as i16 - self.g as i16).abs() <= tol
            && (b as i16 - self.b as i16).abs() <= tol
    }
}

/// Reference colors of the minigame UI and the resource pickup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaletteConfig {
    /// Moving bar the player controls.
    pub bar: ColorSample,
    /// Dark housing border enclosing the track.
    pub housing: ColorSample,
    /// Target line the bar should chase.
    pub target: ColorSample,
    /// Fish marker inside the track.
    pub indicator: ColorSample,
    /// Colors that must all be present before the minigame is considered live.
    pub bite_set: Vec<ColorSample>,
    /// Pixel color confirming a resource (not a fish) was hooked.
    pub resource: ColorSample,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            bar: ColorSample::with_tolerance(85, 170, 255, 10),
            housing: ColorSample::with_tolerance(25, 25, 25, 5),
            target: ColorSample::with_tolerance(255, 255, 255, 5),
            indicator: ColorSample::with_tolerance(25, 25, 25, 5),
            bite_set: vec![
                ColorSample::with_tolerance(85, 170, 255, 10),
                ColorSample::with_tolerance(255, 255, 255, 10),
                ColorSample::with_tolerance(25, 25, 25, 10),
                ColorSample::with_tolerance(170, 255, 0, 10),
                ColorSample::with_tolerance(32, 34, 36, 10),
            ],
            resource: ColorSample::with_tolerance(255, 85, 127, 5),
        }
    }
}

/// PD controller gains and loop timing.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ServoConfig {
    #[serde(default = "default_kp")]
    pub kp: f64,
    #[serde(default = "default_kd")]
    pub kd: f64,
    /// Symmetric clamp applied to the PD output before duty mapping.
    #[serde(default = "default_clamp")]
    pub clamp: f64,
    /// Consecutive frames the indicator may vanish before the button releases.
    #[serde(default = "default_max_lost_frames")]
    pub max_lost_frames: u32,
    /// How often the current button state is re-sent to the game.
    #[serde(default = "default_resend_interval_ms")]
    pub resend_interval_ms: u64,
}

fn default_kp() -> f64 {
    1.0
}

fn default_kd() -> f64 {
    0.1
}

fn default_clamp() -> f64 {
    100.0
}

fn default_max_lost_frames() -> u32 {
    3
}

fn default_resend_interval_ms() -> u64 {
    500
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            kp: default_kp(),
            kd: default_kd(),
            clamp: default_clamp(),
            max_lost_frames: default_max_lost_frames(),
            resend_interval_ms: default_resend_interval_ms(),
        }
    }
}

/// Bait selection settings shared by the OCR and color-only strategies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BaitConfig {
    /// When true, read counts from the bait menu via OCR; otherwise classify
    /// slot swatch colors only.
    #[serde(default)]
    pub use_ocr: bool,
    /// Legendary count at which Stockpile flips back to Burning.
    #[serde(default = "default_legendary_target")]
    pub legendary_target: u32,
    /// Wall-clock budget for a single OCR attempt.
    #[serde(default = "default_ocr_timeout_ms")]
    pub ocr_timeout_ms: u64,
    /// Bait menu region (OCR strategy).
    #[serde(default)]
    pub menu_zone: Option<ScanZone>,
    /// First slot swatch region (color-only strategy).
    #[serde(default)]
    pub top_zone: Option<ScanZone>,
    /// Second slot swatch region (color-only strategy).
    #[serde(default)]
    pub mid_zone: Option<ScanZone>,
    /// Click point of the first bait slot.
    #[serde(default)]
    pub primary_slot: Option<Point>,
    /// Click point of the second bait slot.
    #[serde(default)]
    pub secondary_slot: Option<Point>,
    /// Slot clicked when counts cannot be read.
    #[serde(default)]
    pub fallback_slot: Option<Point>,
    #[serde(default)]
    pub classify: ClassifyProfile,
}

fn default_legendary_target() -> u32 {
    10
}

fn default_ocr_timeout_ms() -> u64 {
    800
}

impl Default for BaitConfig {
    fn default() -> Self {
        Self {
            use_ocr: false,
            legendary_target: default_legendary_target(),
            ocr_timeout_ms: default_ocr_timeout_ms(),
            menu_zone: None,
            top_zone: None,
            mid_zone: None,
            primary_slot: None,
            secondary_slot: None,
            fallback_slot: None,
            classify: ClassifyProfile::default(),
        }
    }
}

/// Keyboard bindings. Key names are passed through to the actuation channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Hotbar slot holding the rod.
    pub rod: String,
    /// Hotbar slot that deselects everything.
    pub deselect: String,
    /// Hotbar slot holding a caught resource.
    pub resource: String,
    /// Key that drops the held item.
    pub drop: String,
    /// World-interact key used to open the bait shop.
    pub interact: String,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            rod: "1".to_string(),
            deselect: "2".to_string(),
            resource: "3".to_string(),
            drop: "backspace".to_string(),
            interact: "e".to_string(),
        }
    }
}

/// Fixed delays between input actions, in milliseconds.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_rod_deselect_delay_ms")]
    pub rod_deselect_delay_ms: u64,
    #[serde(default = "default_rod_select_delay_ms")]
    pub rod_select_delay_ms: u64,
    #[serde(default = "default_bait_click_delay_ms")]
    pub bait_click_delay_ms: u64,
    /// How long the cast click is held.
    #[serde(default = "default_cast_hold_ms")]
    pub cast_hold_ms: u64,
    /// Settle time after the cast before bite scanning starts.
    #[serde(default = "default_minigame_wait_ms")]
    pub minigame_wait_ms: u64,
    #[serde(default = "default_store_click_delay_ms")]
    pub store_click_delay_ms: u64,
    /// Delay between shop dialog steps.
    #[serde(default = "default_shop_step_delay_ms")]
    pub shop_step_delay_ms: u64,
    #[serde(default = "default_key_tap_delay_ms")]
    pub key_tap_delay_ms: u64,
}

fn default_rod_deselect_delay_ms() -> u64 {
    200
}

fn default_rod_select_delay_ms() -> u64 {
    300
}

fn default_bait_click_delay_ms() -> u64 {
    300
}

fn default_cast_hold_ms() -> u64 {
    500
}

fn default_minigame_wait_ms() -> u64 {
    1000
}

fn default_store_click_delay_ms() -> u64 {
    300
}

fn default_shop_step_delay_ms() -> u64 {
    3000
}

fn default_key_tap_delay_ms() -> u64 {
    50
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            rod_deselect_delay_ms: default_rod_deselect_delay_ms(),
            rod_select_delay_ms: default_rod_select_delay_ms(),
            bait_click_delay_ms: default_bait_click_delay_ms(),
            cast_hold_ms: default_cast_hold_ms(),
            minigame_wait_ms: default_minigame_wait_ms(),
            store_click_delay_ms: default_store_click_delay_ms(),
            shop_step_delay_ms: default_shop_step_delay_ms(),
            key_tap_delay_ms: default_key_tap_delay_ms(),
        }
    }
}

/// Periodic bait shop purchase.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShopConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Cycles between purchases; also the quantity typed into the dialog.
    #[serde(default = "default_loops_per_purchase")]
    pub loops_per_purchase: u32,
    #[serde(default)]
    pub yes_button: Option<Point>,
    #[serde(default)]
    pub quantity_button: Option<Point>,
    #[serde(default)]
    pub no_button: Option<Point>,
}

fn default_loops_per_purchase() -> u32 {
    44
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            loops_per_purchase: default_loops_per_purchase(),
            yes_button: None,
            quantity_button: None,
            no_button: None,
        }
    }
}

/// Auto-craft mode: craft bait from caught fish instead of buying it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CraftConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Craft after every N fish; 0 crafts before every cast.
    #[serde(default)]
    pub craft_every_n_fish: u32,
    #[serde(default = "default_craft_quantity")]
    pub common_quantity: u32,
    #[serde(default = "default_craft_quantity")]
    pub rare_quantity: u32,
    #[serde(default = "default_craft_quantity")]
    pub legendary_quantity: u32,
    #[serde(default)]
    pub common_icon: Option<Point>,
    #[serde(default)]
    pub rare_icon: Option<Point>,
    #[serde(default)]
    pub legendary_icon: Option<Point>,
    #[serde(default)]
    pub plus_button: Option<Point>,
    #[serde(default)]
    pub fish_button: Option<Point>,
    #[serde(default)]
    pub craft_button: Option<Point>,
    #[serde(default = "default_craft_step_delay_ms")]
    pub step_delay_ms: u64,
}

fn default_craft_quantity() -> u32 {
    1
}

fn default_craft_step_delay_ms() -> u64 {
    300
}

impl Default for CraftConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            craft_every_n_fish: 0,
            common_quantity: default_craft_quantity(),
            rare_quantity: default_craft_quantity(),
            legendary_quantity: default_craft_quantity(),
            common_icon: None,
            rare_icon: None,
            legendary_icon: None,
            plus_button: None,
            fish_button: None,
            craft_button: None,
            step_delay_ms: default_craft_step_delay_ms(),
        }
    }
}

/// Complete bot configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub palette: PaletteConfig,
    #[serde(default)]
    pub servo: ServoConfig,
    #[serde(default)]
    pub bait: BaitConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub shop: ShopConfig,
    #[serde(default)]
    pub craft: CraftConfig,
    /// Minigame track region. Nothing can be fished without it.
    #[serde(default)]
    pub minigame_zone: Option<ScanZone>,
    /// Where the cast click lands.
    #[serde(default)]
    pub water_point: Option<Point>,
    /// Pixel checked for the resource color after a catch.
    #[serde(default)]
    pub resource_point: Option<Point>,
    /// Clicked to store a detected resource.
    #[serde(default)]
    pub store_point: Option<Point>,
    /// Seconds to wait for a bite before recasting.
    #[serde(default = "default_recast_timeout_secs")]
    pub recast_timeout_secs: u64,
    /// Fraction of pure-black pixels that flags a blanked screen.
    #[serde(default = "default_blank_threshold")]
    pub blank_threshold: f32,
    /// Frame cache lifetime for non-minigame consumers.
    #[serde(default = "default_capture_cache_ms")]
    pub capture_cache_ms: u64,
}

fn default_recast_timeout_secs() -> u64 {
    30
}

fn default_blank_threshold() -> f32 {
    0.5
}

fn default_capture_cache_ms() -> u64 {
    16
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            palette: PaletteConfig::default(),
            servo: ServoConfig::default(),
            bait: BaitConfig::default(),
            keys: KeysConfig::default(),
            timing: TimingConfig::default(),
            shop: ShopConfig::default(),
            craft: CraftConfig::default(),
            minigame_zone: None,
            water_point: None,
            resource_point: None,
            store_point: None,
            recast_timeout_secs: default_recast_timeout_secs(),
            blank_threshold: default_blank_threshold(),
            capture_cache_ms: default_capture_cache_ms(),
        }
    }
}

/// Loads configuration from a JSON file, falling back to defaults.
pub fn load_config(path: &Path) -> BotConfig {
    if path.exists() {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    crate::log(&format!("Config loaded from {}", path.display()));
                    return config;
                }
                Err(e) => {
                    crate::log(&format!("Failed to parse {}: {}. Using defaults.", path.display(), e));
                }
            },
            Err(e) => {
                crate::log(&format!("Failed to read {}: {}. Using defaults.", path.display(), e));
            }
        }
    } else {
        crate::log(&format!("No config at {}, using defaults", path.display()));
    }
    BotConfig::default()
}

/// Section-granular update applied between cycles. `None` leaves the section
/// untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub palette: Option<PaletteConfig>,
    pub servo: Option<ServoConfig>,
    pub bait: Option<BaitConfig>,
    pub keys: Option<KeysConfig>,
    pub timing: Option<TimingConfig>,
    pub shop: Option<ShopConfig>,
    pub craft: Option<CraftConfig>,
    pub minigame_zone: Option<Option<ScanZone>>,
    pub water_point: Option<Option<Point>>,
    pub resource_point: Option<Option<Point>>,
    pub store_point: Option<Option<Point>>,
    pub recast_timeout_secs: Option<u64>,
    pub blank_threshold: Option<f32>,
}

/// Shared handle the host and the worker both hold. The worker clones a
/// snapshot at cycle start; patches land in between.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<Mutex<BotConfig>>,
}

impl ConfigHandle {
    pub fn new(config: BotConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(config)),
        }
    }

    /// Immutable copy of the current configuration.
    pub fn snapshot(&self) -> BotConfig {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Merges a patch. Takes effect at the next cycle boundary.
    pub fn apply_update(&self, patch: ConfigPatch) {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(palette) = patch.palette {
            guard.palette = palette;
        }
        if let Some(servo) = patch.servo {
            guard.servo = servo;
        }
        if let Some(bait) = patch.bait {
            guard.bait = bait;
        }
        if let Some(keys) = patch.keys {
            guard.keys = keys;
        }
        if let Some(timing) = patch.timing {
            guard.timing = timing;
        }
        if let Some(shop) = patch.shop {
            guard.shop = shop;
        }
        if let Some(craft) = patch.craft {
            guard.craft = craft;
        }
        if let Some(zone) = patch.minigame_zone {
            guard.minigame_zone = zone;
        }
        if let Some(point) = patch.water_point {
            guard.water_point = point;
        }
        if let Some(point) = patch.resource_point {
            guard.resource_point = point;
        }
        if let Some(point) = patch.store_point {
            guard.store_point = point;
        }
        if let Some(secs) = patch.recast_timeout_secs {
            guard.recast_timeout_secs = secs;
        }
        if let Some(threshold) = patch.blank_threshold {
            guard.blank_threshold = threshold;
        }
    }
}
