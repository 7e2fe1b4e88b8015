//! Cycle orchestration.
//!
//! One fishing cycle is PreCast -> AwaitBite -> PlayMinigame, looped forever
//! on the worker thread. A blanked screen (automation countermeasure) routes
//! through Recovering until the view clears. The orchestrator is the only
//! source of actuation commands.

pub mod precast;
pub mod runner;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::bait::{BaitEngine, BaitMode};
use crate::capture::{CachedCapture, CaptureProvider};
use crate::config::{BotConfig, ConfigHandle};
use crate::events::EventSink;
use crate::input::{ActuationChannel, Actuator};
use crate::ocr::TextRecognizer;
use crate::ocr::adapter::OcrAdapter;
use crate::servo::{ServoController, StepOutcome};
use crate::timing::{CancelToken, interruptible_sleep};
use crate::vision::{blackout, pixels};

use precast::{AutoCraftPreCast, NormalPreCast, PreCastStage, StageOutcome, StageWorld};

/// Where the orchestrator is in the fishing cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleStage {
    Idle,
    FirstRunInit,
    PreCast,
    AwaitBite,
    PlayMinigame,
    Recovering,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleStage::Idle => "Idle",
            CycleStage::FirstRunInit => "First run setup",
            CycleStage::PreCast => "Pre-cast",
            CycleStage::AwaitBite => "Scanning for bite",
            CycleStage::PlayMinigame => "Fishing",
            CycleStage::Recovering => "Recovering",
        };
        write!(f, "{}", name)
    }
}

/// Session tallies shared by the stages.
pub struct SessionCounters {
    pub fish: u64,
    pub resources: u64,
    /// The first minigame completion after start finishes a cast made before
    /// the session began and is not counted.
    pub first_catch: bool,
}

impl SessionCounters {
    pub fn new() -> Self {
        Self { fish: 0, resources: 0, first_catch: true }
    }
}

/// Everything the host wires in to run the cycle worker.
pub struct CycleDeps {
    pub config: ConfigHandle,
    pub capture: Box<dyn CaptureProvider>,
    pub input: Box<dyn ActuationChannel>,
    pub recognizer: Option<Box<dyn TextRecognizer>>,
    pub events: Arc<dyn EventSink>,
    pub initial_mode: BaitMode,
    /// Called on every bait mode transition so the host can persist it.
    pub persist_mode: Box<dyn Fn(BaitMode) + Send>,
}

enum BiteOutcome {
    Bite,
    Timeout,
    Blanked,
    Cancelled,
}

/// The cycle state machine. Drive it with [`Orchestrator::step`] until it
/// returns `Ok(false)`.
pub struct Orchestrator {
    config: ConfigHandle,
    capture: CachedCapture,
    actuator: Actuator,
    bait: BaitEngine,
    ocr: Option<OcrAdapter>,
    events: Arc<dyn EventSink>,
    cancel: CancelToken,
    stage: CycleStage,
    counters: SessionCounters,
    normal: NormalPreCast,
    auto_craft: AutoCraftPreCast,
    servo: Option<ServoController>,
}

impl Orchestrator {
    pub fn new(deps: CycleDeps, cancel: CancelToken) -> Self {
        let snapshot = deps.config.snapshot();
        let ocr = deps.recognizer.map(|recognizer| {
            OcrAdapter::new(
                recognizer,
                Duration::from_millis(snapshot.bait.ocr_timeout_ms),
            )
        });
        Self {
            config: deps.config,
            capture: CachedCapture::new(
                deps.capture,
                Duration::from_millis(snapshot.capture_cache_ms),
            ),
            actuator: Actuator::new(deps.input),
            bait: BaitEngine::new(deps.initial_mode, deps.persist_mode),
            ocr,
            events: deps.events,
            cancel,
            stage: CycleStage::Idle,
            counters: SessionCounters::new(),
            normal: NormalPreCast::new(),
            auto_craft: AutoCraftPreCast::new(),
            servo: None,
        }
    }

    pub fn fish_caught(&self) -> u64 {
        self.counters.fish
    }

    pub fn bait_mode(&self) -> BaitMode {
        self.bait.mode()
    }

    /// Releases the button. Called at the worker boundary on any exit.
    pub fn shutdown(&mut self) {
        self.actuator.force_release();
    }

    /// Runs one stage of the cycle. `Ok(false)` means the worker should stop.
    pub fn step(&mut self) -> Result<bool> {
        if self.cancel.is_cancelled() {
            self.actuator.force_release();
            return Ok(false);
        }

        // A held button must never survive a stage boundary
        self.actuator.force_release();

        let cfg = self.config.snapshot();
        self.events.on_status(&self.stage.to_string());

        match self.stage {
            CycleStage::Idle => {
                crate::log("Cycle started");
                self.stage = CycleStage::FirstRunInit;
            }
            CycleStage::FirstRunInit => {
                if !self.first_run_init(&cfg) {
                    return Ok(false);
                }
                self.stage = CycleStage::PreCast;
            }
            CycleStage::PreCast => match self.run_precast(&cfg) {
                StageOutcome::Done => self.stage = CycleStage::AwaitBite,
                StageOutcome::Failed => {
                    if !self.pause(500) {
                        return Ok(false);
                    }
                }
                StageOutcome::Cancelled => {
                    self.actuator.force_release();
                    return Ok(false);
                }
            },
            CycleStage::AwaitBite => match self.await_bite(&cfg) {
                BiteOutcome::Bite => {
                    let Some(zone) = cfg.minigame_zone else {
                        self.stage = CycleStage::PreCast;
                        return Ok(true);
                    };
                    self.servo = Some(ServoController::new(
                        cfg.servo,
                        cfg.palette.clone(),
                        zone,
                    ));
                    self.stage = CycleStage::PlayMinigame;
                }
                BiteOutcome::Timeout => {
                    crate::log("No bite before timeout, recasting");
                    self.stage = CycleStage::PreCast;
                }
                BiteOutcome::Blanked => {
                    crate::log("Blank screen detected during bite scan");
                    self.stage = CycleStage::Recovering;
                }
                BiteOutcome::Cancelled => return Ok(false),
            },
            CycleStage::PlayMinigame => {
                if !self.play_minigame(&cfg)? {
                    return Ok(false);
                }
            }
            CycleStage::Recovering => {
                if !self.recover(&cfg) {
                    return Ok(false);
                }
                self.stage = CycleStage::PreCast;
            }
        }

        Ok(true)
    }

    fn pause(&self, ms: u64) -> bool {
        interruptible_sleep(&self.cancel, Duration::from_millis(ms))
    }

    /// One-time camera normalization: deselect, select the rod, then scroll
    /// to full zoom and back out to the canonical distance the scan zones
    /// were calibrated at.
    fn first_run_init(&mut self, cfg: &BotConfig) -> bool {
        crate::log("First run: normalizing camera");

        self.actuator.tap_key(&cfg.keys.deselect);
        if !self.pause(cfg.timing.rod_deselect_delay_ms) {
            return false;
        }
        self.actuator.tap_key(&cfg.keys.rod);
        if !self.pause(cfg.timing.rod_select_delay_ms) {
            return false;
        }

        // Zoom fully in first so the zoom-out count lands the same regardless
        // of where the camera started
        for _ in 0..30 {
            self.actuator.scroll(1);
            if !self.pause(10) {
                return false;
            }
        }
        if !self.pause(100) {
            return false;
        }
        for _ in 0..13 {
            self.actuator.scroll(-1);
            if !self.pause(10) {
                return false;
            }
        }
        if !self.pause(cfg.timing.rod_select_delay_ms) {
            return false;
        }

        crate::log("First run: setup complete");
        true
    }

    fn run_precast(&mut self, cfg: &BotConfig) -> StageOutcome {
        let mut world = StageWorld {
            cfg,
            capture: &mut self.capture,
            actuator: &mut self.actuator,
            bait: &mut self.bait,
            ocr: self.ocr.as_mut(),
            events: self.events.as_ref(),
            cancel: &self.cancel,
            counters: &mut self.counters,
        };
        if cfg.craft.enabled {
            self.auto_craft.run(&mut world)
        } else {
            self.normal.run(&mut world)
        }
    }

    /// Polls the minigame zone at a frame-skipped rate until every reference
    /// color is present at once, the recast timeout elapses, or the screen
    /// blanks out.
    fn await_bite(&mut self, cfg: &BotConfig) -> BiteOutcome {
        let Some(zone) = cfg.minigame_zone else {
            crate::log("Bite scan: no minigame zone configured");
            if !self.pause(1000) {
                return BiteOutcome::Cancelled;
            }
            return BiteOutcome::Timeout;
        };

        let deadline = Instant::now() + Duration::from_secs(cfg.recast_timeout_secs);
        let mut frame_counter = 0u32;

        while !self.cancel.is_cancelled() {
            if Instant::now() >= deadline {
                return BiteOutcome::Timeout;
            }

            // Only every third frame is inspected; detection does not need
            // the full capture rate
            frame_counter += 1;
            if frame_counter % 3 != 0 {
                if !self.pause(30) {
                    return BiteOutcome::Cancelled;
                }
                continue;
            }

            if let Some(frame) = self.capture.capture(&zone, false) {
                if blackout::is_blanked(&frame, cfg.blank_threshold) {
                    return BiteOutcome::Blanked;
                }
                let all_present = cfg
                    .palette
                    .bite_set
                    .iter()
                    .all(|sample| pixels::contains_color(&frame, sample));
                if all_present {
                    crate::log("Bite detected, all reference colors present");
                    return BiteOutcome::Bite;
                }
            }

            if !self.pause(50) {
                return BiteOutcome::Cancelled;
            }
        }
        BiteOutcome::Cancelled
    }

    /// Runs the servo loop until the minigame ends, then tallies the catch
    /// and checks for a post-fishing blank screen.
    fn play_minigame(&mut self, cfg: &BotConfig) -> Result<bool> {
        let Some(servo) = self.servo.as_mut() else {
            self.stage = CycleStage::PreCast;
            return Ok(true);
        };

        loop {
            if self.cancel.is_cancelled() {
                self.actuator.force_release();
                return Ok(false);
            }
            match servo.step(&mut self.capture, &mut self.actuator)? {
                StepOutcome::Continue => {}
                StepOutcome::Completed => break,
            }
        }
        self.servo = None;

        if self.counters.first_catch {
            self.counters.first_catch = false;
            crate::log("First minigame complete, not counted");
        } else {
            self.counters.fish += 1;
            crate::log(&format!("Fish caught, total {}", self.counters.fish));
            self.events.on_fish_caught(self.counters.fish);
        }

        // The countermeasure can also land right after a catch
        self.stage = match cfg
            .minigame_zone
            .and_then(|zone| self.capture.capture_with_retry(&zone, &self.cancel))
        {
            Some(frame) if blackout::is_blanked(&frame, cfg.blank_threshold) => {
                crate::log("Blank screen detected after fishing");
                CycleStage::Recovering
            }
            _ => CycleStage::PreCast,
        };
        Ok(true)
    }

    /// Taps the deselect key and re-samples until the screen clears. No
    /// timeout; only clearing or cancellation exits.
    fn recover(&mut self, cfg: &BotConfig) -> bool {
        let Some(zone) = cfg.minigame_zone else {
            return true;
        };

        crate::log("Recovery: waiting for the screen to clear");
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }

            if let Some(frame) = self.capture.capture(&zone, true) {
                if !blackout::is_blanked(&frame, cfg.blank_threshold) {
                    crate::log("Recovery: screen cleared");
                    return self.pause(500);
                }
            }

            self.actuator.tap_key(&cfg.keys.deselect);
            if !self.pause(1000) {
                return false;
            }
        }
    }
}
