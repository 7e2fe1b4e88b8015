//! Pixel-level screen reading: color matching, bait classification and the
//! blanked-screen detector.

pub mod blackout;
pub mod classify;
pub mod pixels;
