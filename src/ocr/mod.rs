//! Text recognition seam.
//!
//! The host supplies the actual OCR engine; this crate only needs positioned
//! text fragments back. [`adapter::OcrAdapter`] adds the wall-clock timeout
//! and retry ladder around it.

pub mod adapter;
pub mod preprocess;

use anyhow::Result;
use image::GrayImage;

/// A recognized word with its bounding box, in image-local pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrFragment {
    pub text: String,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl OcrFragment {
    /// Vertical center of the bounding box, used for line grouping.
    pub fn center_y(&self) -> u32 {
        self.top + self.height / 2
    }
}

/// Host-provided OCR engine. Called from the adapter's worker thread only.
pub trait TextRecognizer: Send {
    fn recognize(&mut self, image: &GrayImage) -> Result<Vec<OcrFragment>>;
}
