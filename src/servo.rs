//! Visual servo controller for the timing minigame.
//!
//! Each tick reads one fresh frame of the minigame zone, locates the moving
//! bar column, the target line and the fish indicator inside the housing
//! border, and drives the cast button with a PD controller so the indicator
//! tracks the target. The bar color disappearing from the zone means the
//! minigame ended.

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::capture::CachedCapture;
use crate::config::{PaletteConfig, ScanZone, ServoConfig};
use crate::input::Actuator;
use crate::vision::pixels;

/// Frame budget for one tick (60 Hz cap).
const FRAME_TIME: Duration = Duration::from_micros(16_667);

/// Result of one controller tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Minigame still running, call again.
    Continue,
    /// Bar vanished, the minigame is over.
    Completed,
}

struct ControllerState {
    last_error: f64,
    last_sample: Instant,
    lost_frames: u32,
    last_resend: Instant,
}

impl ControllerState {
    fn reset() -> Self {
        let now = Instant::now();
        Self {
            last_error: 0.0,
            last_sample: now,
            lost_frames: 0,
            last_resend: now,
        }
    }
}

/// PD loop state for one minigame. Construct fresh at minigame entry.
pub struct ServoController {
    cfg: ServoConfig,
    palette: PaletteConfig,
    zone: ScanZone,
    state: ControllerState,
}

impl ServoController {
    pub fn new(cfg: ServoConfig, palette: PaletteConfig, zone: ScanZone) -> Self {
        Self {
            cfg,
            palette,
            zone,
            state: ControllerState::reset(),
        }
    }

    /// Runs one tick: sample, track, actuate, sleep out the frame budget.
    ///
    /// A failed capture skips the tick. `Completed` means the bar is gone
    /// and the button has been released.
    pub fn step(&mut self, capture: &mut CachedCapture, actuator: &mut Actuator) -> Result<StepOutcome> {
        let tick_start = Instant::now();

        // Control stability needs sub-frame latency; never serve from cache
        let Some(frame) = capture.capture(&self.zone, true) else {
            Self::sleep_remainder(tick_start);
            return Ok(StepOutcome::Continue);
        };

        let Some(bar_x) = pixels::find_color_mean_x(&frame, &self.palette.bar) else {
            actuator.force_release();
            self.state = ControllerState::reset();
            return Ok(StepOutcome::Completed);
        };

        let Some((housing_top, housing_bottom)) =
            pixels::column_color_bounds(&frame, bar_x, &self.palette.housing)
        else {
            Self::sleep_remainder(tick_start);
            return Ok(StepOutcome::Continue);
        };

        let Some((target_top, target_bottom)) = pixels::column_color_bounds_in_span(
            &frame,
            bar_x,
            housing_top,
            housing_bottom,
            &self.palette.target,
        ) else {
            // Target hidden behind overlay text; hold so the bar rides to
            // the top where the target usually sits
            actuator.set_held(true);
            self.state.last_error = 0.0;
            Self::sleep_remainder(tick_start);
            return Ok(StepOutcome::Continue);
        };

        let target_mid = f64::from(target_top + target_bottom) / 2.0;
        let target_height = target_bottom - target_top;
        let max_gap = 5u32.max(target_height / 5);

        // The housing border shares the indicator color; search strictly
        // inside the track so an absent fish reads as absent
        let indicator_mid = pixels::largest_run_center(
            &frame,
            bar_x,
            housing_top + 1,
            housing_bottom.saturating_sub(1),
            &self.palette.indicator,
            max_gap,
        );

        let Some(indicator_mid) = indicator_mid else {
            self.state.lost_frames += 1;
            if self.state.lost_frames > self.cfg.max_lost_frames {
                actuator.set_held(false);
                self.state.last_error = 0.0;
            }
            // Below the threshold the last button state rides through
            Self::sleep_remainder(tick_start);
            return Ok(StepOutcome::Continue);
        };
        self.state.lost_frames = 0;

        // Positive error: indicator below target, hold to move the bar up
        let error = f64::from(indicator_mid) - target_mid;

        let now = Instant::now();
        let dt = now.duration_since(self.state.last_sample).as_secs_f64();
        if dt > 0.0 {
            let p_term = self.cfg.kp * error;
            let d_term = self.cfg.kd * (error - self.state.last_error) / dt;
            let pd = (p_term + d_term).clamp(-self.cfg.clamp, self.cfg.clamp);

            let duty = (0.5 + pd / (2.0 * self.cfg.clamp)).clamp(0.0, 1.0);
            actuator.set_held(duty > 0.5);

            if now.duration_since(self.state.last_resend)
                >= Duration::from_millis(self.cfg.resend_interval_ms)
            {
                actuator.reassert();
                self.state.last_resend = now;
            }

            self.state.last_error = error;
            self.state.last_sample = now;
        }

        Self::sleep_remainder(tick_start);
        Ok(StepOutcome::Continue)
    }

    fn sleep_remainder(tick_start: Instant) {
        let elapsed = tick_start.elapsed();
        let remainder = FRAME_TIME
            .checked_sub(elapsed)
            .unwrap_or(Duration::from_millis(1))
            .max(Duration::from_millis(1));
        std::thread::sleep(remainder);
    }

    #[cfg(test)]
    fn lost_frames(&self) -> u32 {
        self.state.lost_frames
    }
}
