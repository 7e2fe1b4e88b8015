//! Screen capture seam.
//!
//! The host supplies the actual screenshot primitive; this module wraps it
//! with a short-lived frame cache so stages polling the same zone within a
//! frame don't pay for duplicate captures. Minigame sampling bypasses the
//! cache, stale frames there mean oscillation.

use image::{ImageBuffer, Rgba};
use std::time::{Duration, Instant};

use crate::config::{Point, ScanZone};
use crate::timing::{CancelToken, interruptible_sleep};

/// A captured screen region, RGBA.
pub type Frame = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Host-provided screenshot primitive. `None` means the capture transiently
/// failed (window occluded, device lost); callers decide whether to retry.
pub trait CaptureProvider: Send {
    fn capture_region(&mut self, zone: &ScanZone) -> Option<Frame>;

    /// Single-pixel read as (r, g, b). Defaults to a 1x1 region capture.
    fn capture_pixel(&mut self, point: &Point) -> Option<(u8, u8, u8)> {
        let zone = ScanZone { x: point.x, y: point.y, width: 1, height: 1 };
        let frame = self.capture_region(&zone)?;
        let px = frame.get_pixel(0, 0);
        Some((px[0], px[1], px[2]))
    }
}

/// Capture front-end with a per-zone memo of the last frame.
pub struct CachedCapture {
    provider: Box<dyn CaptureProvider>,
    ttl: Duration,
    last: Option<(ScanZone, Frame, Instant)>,
}

impl CachedCapture {
    pub fn new(provider: Box<dyn CaptureProvider>, ttl: Duration) -> Self {
        Self { provider, ttl, last: None }
    }

    /// Captures `zone`, serving a cached frame when it is younger than the
    /// TTL and covers the same zone. `fresh` forces a real capture.
    pub fn capture(&mut self, zone: &ScanZone, fresh: bool) -> Option<Frame> {
        if !fresh {
            if let Some((cached_zone, frame, taken)) = &self.last {
                if cached_zone == zone && taken.elapsed() < self.ttl {
                    return Some(frame.clone());
                }
            }
        }
        let frame = self.provider.capture_region(zone)?;
        self.last = Some((*zone, frame.clone(), Instant::now()));
        Some(frame)
    }

    pub fn capture_pixel(&mut self, point: &Point) -> Option<(u8, u8, u8)> {
        self.provider.capture_pixel(point)
    }

    /// Retries a fresh capture up to 3 times with a short backoff. Returns
    /// `None` on cancellation or persistent failure.
    pub fn capture_with_retry(&mut self, zone: &ScanZone, token: &CancelToken) -> Option<Frame> {
        for attempt in 0..3 {
            if token.is_cancelled() {
                return None;
            }
            if let Some(frame) = self.capture(zone, true) {
                return Some(frame);
            }
            if attempt < 2 {
                crate::log(&format!("Capture failed (attempt {}), retrying", attempt + 1));
                if !interruptible_sleep(token, Duration::from_millis(250)) {
                    return None;
                }
            }
        }
        None
    }
}
