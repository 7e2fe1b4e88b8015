//! Input injection seam.
//!
//! The host supplies the raw mouse/keyboard primitive; [`Actuator`] wraps it
//! and is the only owner of the logical button-held flag. Every exit path
//! (normal, error, cancellation, drop) funnels through it, so the tracked
//! state and the physical button cannot diverge.

use std::time::Duration;

use crate::config::Point;

/// Host-provided input primitive. Calls are best-effort; the game gets
/// whatever the platform delivers.
pub trait ActuationChannel: Send {
    fn move_to(&mut self, point: &Point);
    fn button_down(&mut self);
    fn button_up(&mut self);
    fn tap_key(&mut self, key: &str);
    fn scroll(&mut self, ticks: i32);
    fn drag(&mut self, from: &Point, to: &Point);

    /// Press-hold-release at a point.
    fn click(&mut self, point: &Point, hold: Duration) {
        self.move_to(point);
        self.button_down();
        std::thread::sleep(hold);
        self.button_up();
    }
}

/// Stateful wrapper around the actuation channel.
pub struct Actuator {
    channel: Box<dyn ActuationChannel>,
    held: bool,
}

impl Actuator {
    pub fn new(channel: Box<dyn ActuationChannel>) -> Self {
        Self { channel, held: false }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Drives the button toward `held`, emitting an event only on change.
    pub fn set_held(&mut self, held: bool) {
        if held == self.held {
            return;
        }
        if held {
            self.channel.button_down();
        } else {
            self.channel.button_up();
        }
        self.held = held;
    }

    /// Re-sends the current state unconditionally. The game occasionally
    /// drops a held button; a periodic resend recovers it.
    pub fn reassert(&mut self) {
        if self.held {
            self.channel.button_down();
        } else {
            self.channel.button_up();
        }
    }

    /// Releases the button if held. Safe on every exit path.
    pub fn force_release(&mut self) {
        if self.held {
            self.channel.button_up();
            self.held = false;
        }
    }

    pub fn move_to(&mut self, point: &Point) {
        self.channel.move_to(point);
    }

    pub fn tap_key(&mut self, key: &str) {
        self.channel.tap_key(key);
    }

    pub fn scroll(&mut self, ticks: i32) {
        self.channel.scroll(ticks);
    }

    pub fn drag(&mut self, from: &Point, to: &Point) {
        self.channel.drag(from, to);
    }

    pub fn click(&mut self, point: &Point, hold: Duration) {
        self.channel.click(point, hold);
    }
}

impl Drop for Actuator {
    fn drop(&mut self) {
        self.force_release();
    }
}
