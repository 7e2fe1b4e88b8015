//! Host notification hooks.
//!
//! The worker reports progress through an [`EventSink`] the host supplies.
//! Calls are synchronous and made from the worker thread; hosts must hand off
//! to their own queue instead of blocking.

use crate::bait::BaitMode;

/// Fire-and-forget notifications. Every method has a no-op default so hosts
/// implement only what they care about.
pub trait EventSink: Send + Sync {
    /// Human-readable stage/progress line, suitable for a status bar.
    fn on_status(&self, _status: &str) {}

    /// A minigame completed; `total` is the running tally for this session.
    fn on_fish_caught(&self, _total: u64) {}

    /// A resource pickup was detected and stored.
    fn on_resource_caught(&self, _total: u64) {}

    /// The bait engine switched modes (auto-switch or explicit set).
    fn on_mode_changed(&self, _mode: BaitMode) {}

    /// Why the bait engine picked what it picked.
    fn on_decision_explained(&self, _explanation: &str) {}
}

/// Sink that discards everything.
pub struct NullEvents;

impl EventSink for NullEvents {}
