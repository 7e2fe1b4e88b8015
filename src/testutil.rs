//! Shared test doubles for the capture, input, OCR and event seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use image::GrayImage;

use crate::bait::BaitMode;
use crate::capture::{CaptureProvider, Frame};
use crate::config::{Point, ScanZone};
use crate::events::EventSink;
use crate::input::ActuationChannel;
use crate::ocr::{OcrFragment, TextRecognizer};

/// Capture provider that plays back a fixed sequence of frames, `None` for a
/// failed capture. Returns `None` once the script runs out.
pub struct ScriptedCapture {
    frames: VecDeque<Option<Frame>>,
    count: Arc<AtomicU32>,
}

impl ScriptedCapture {
    pub fn new(frames: Vec<Option<Frame>>) -> Self {
        Self {
            frames: frames.into(),
            count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Counter of `capture_region` calls, shared with the caller.
    pub fn capture_count(&self) -> Arc<AtomicU32> {
        self.count.clone()
    }
}

impl CaptureProvider for ScriptedCapture {
    fn capture_region(&mut self, _zone: &ScanZone) -> Option<Frame> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.frames.pop_front().flatten()
    }
}

/// One observable action on the actuation channel.
#[derive(Clone, Debug, PartialEq)]
pub enum ActuationEvent {
    MoveTo(i32, i32),
    ButtonDown,
    ButtonUp,
    TapKey(String),
    Scroll(i32),
    Drag(Point, Point),
    Click(i32, i32),
}

/// Actuation channel that records every call. `click` is recorded as a single
/// event and does not sleep out the hold.
pub struct RecordingActuation {
    events: Arc<Mutex<Vec<ActuationEvent>>>,
}

impl RecordingActuation {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<ActuationEvent>>> {
        self.events.clone()
    }

    fn push(&self, event: ActuationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl ActuationChannel for RecordingActuation {
    fn move_to(&mut self, point: &Point) {
        self.push(ActuationEvent::MoveTo(point.x, point.y));
    }

    fn button_down(&mut self) {
        self.push(ActuationEvent::ButtonDown);
    }

    fn button_up(&mut self) {
        self.push(ActuationEvent::ButtonUp);
    }

    fn tap_key(&mut self, key: &str) {
        self.push(ActuationEvent::TapKey(key.to_string()));
    }

    fn scroll(&mut self, ticks: i32) {
        self.push(ActuationEvent::Scroll(ticks));
    }

    fn drag(&mut self, from: &Point, to: &Point) {
        self.push(ActuationEvent::Drag(*from, *to));
    }

    fn click(&mut self, point: &Point, _hold: Duration) {
        self.push(ActuationEvent::Click(point.x, point.y));
    }
}

/// Recognizer that plays back one fragment set per call, empty once the
/// script runs out.
pub struct ScriptedRecognizer {
    responses: VecDeque<Vec<OcrFragment>>,
}

impl ScriptedRecognizer {
    pub fn new(responses: Vec<Vec<OcrFragment>>) -> Self {
        Self {
            responses: responses.into(),
        }
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&mut self, _image: &GrayImage) -> Result<Vec<OcrFragment>> {
        Ok(self.responses.pop_front().unwrap_or_default())
    }
}

/// Recognizer that answers every request with the same fragments.
pub struct StaticRecognizer {
    fragments: Vec<OcrFragment>,
}

impl StaticRecognizer {
    pub fn new(fragments: Vec<OcrFragment>) -> Self {
        Self { fragments }
    }
}

impl TextRecognizer for StaticRecognizer {
    fn recognize(&mut self, _image: &GrayImage) -> Result<Vec<OcrFragment>> {
        Ok(self.fragments.clone())
    }
}

/// Event sink that stores every notification for later assertions.
pub struct CollectingEvents {
    statuses: Mutex<Vec<String>>,
    fish: Mutex<Vec<u64>>,
    resources: Mutex<Vec<u64>>,
    modes: Mutex<Vec<BaitMode>>,
    decisions: Mutex<Vec<String>>,
}

impl CollectingEvents {
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(Vec::new()),
            fish: Mutex::new(Vec::new()),
            resources: Mutex::new(Vec::new()),
            modes: Mutex::new(Vec::new()),
            decisions: Mutex::new(Vec::new()),
        }
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn fish_totals(&self) -> Vec<u64> {
        self.fish.lock().unwrap().clone()
    }

    pub fn resource_totals(&self) -> Vec<u64> {
        self.resources.lock().unwrap().clone()
    }

    pub fn mode_changes(&self) -> Vec<BaitMode> {
        self.modes.lock().unwrap().clone()
    }

    pub fn decisions(&self) -> Vec<String> {
        self.decisions.lock().unwrap().clone()
    }
}

impl EventSink for CollectingEvents {
    fn on_status(&self, status: &str) {
        self.statuses.lock().unwrap().push(status.to_string());
    }

    fn on_fish_caught(&self, total: u64) {
        self.fish.lock().unwrap().push(total);
    }

    fn on_resource_caught(&self, total: u64) {
        self.resources.lock().unwrap().push(total);
    }

    fn on_mode_changed(&self, mode: BaitMode) {
        self.modes.lock().unwrap().push(mode);
    }

    fn on_decision_explained(&self, explanation: &str) {
        self.decisions.lock().unwrap().push(explanation.to_string());
    }
}
