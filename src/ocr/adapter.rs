//! Bounded-time OCR front-end.
//!
//! Recognition runs on one long-lived worker thread; callers wait with a
//! wall-clock timeout. A slow engine can overrun its budget but only ever
//! ties up that one thread, and its late result is discarded by sequence
//! number instead of being mistaken for the next answer.

use anyhow::{Result, anyhow};
use image::GrayImage;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::preprocess;
use super::{OcrFragment, TextRecognizer};
use crate::capture::Frame;

struct Request {
    seq: u64,
    image: GrayImage,
}

struct Response {
    seq: u64,
    result: Result<Vec<OcrFragment>>,
}

/// Timeout-guarded handle to the recognizer worker.
pub struct OcrAdapter {
    request_tx: Sender<Request>,
    response_rx: Receiver<Response>,
    next_seq: u64,
    timeout: Duration,
    worker: Option<JoinHandle<()>>,
}

impl OcrAdapter {
    /// Spawns the worker thread that owns the recognizer.
    pub fn new(mut recognizer: Box<dyn TextRecognizer>, timeout: Duration) -> Self {
        let (request_tx, request_rx) = channel::<Request>();
        let (response_tx, response_rx) = channel::<Response>();

        let worker = std::thread::spawn(move || {
            while let Ok(request) = request_rx.recv() {
                let result = recognizer.recognize(&request.image);
                if response_tx
                    .send(Response { seq: request.seq, result })
                    .is_err()
                {
                    break;
                }
            }
        });

        Self {
            request_tx,
            response_rx,
            next_seq: 0,
            timeout,
            worker: Some(worker),
        }
    }

    /// One recognition attempt with the configured wall-clock budget.
    pub fn recognize_timeout(&mut self, image: GrayImage) -> Result<Vec<OcrFragment>> {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.request_tx
            .send(Request { seq, image })
            .map_err(|_| anyhow!("OCR worker is gone"))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(anyhow!("OCR timed out after {:?}", self.timeout));
            }
            match self.response_rx.recv_timeout(deadline - now) {
                Ok(response) if response.seq == seq => return response.result,
                // Answer to an attempt that already timed out
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(anyhow!("OCR timed out after {:?}", self.timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("OCR worker is gone"));
                }
            }
        }
    }

    /// Full read ladder over a captured frame: three timed attempts on the
    /// plain grayscale, then one on a binarized variant. `None` when every
    /// rung fails or times out.
    pub fn read_fragments(&mut self, frame: &Frame) -> Option<Vec<OcrFragment>> {
        let gray = preprocess::to_gray(frame);

        for attempt in 1..=3 {
            match self.recognize_timeout(gray.clone()) {
                Ok(fragments) if !fragments.is_empty() => return Some(fragments),
                Ok(_) => crate::log(&format!("OCR attempt {} found no text", attempt)),
                Err(e) => crate::log(&format!("OCR attempt {} failed: {}", attempt, e)),
            }
        }

        let enhanced = preprocess::adaptive_threshold_inverted(&gray, 11, 2);
        match self.recognize_timeout(enhanced) {
            Ok(fragments) if !fragments.is_empty() => Some(fragments),
            Ok(_) => None,
            Err(e) => {
                crate::log(&format!("OCR enhanced attempt failed: {}", e));
                None
            }
        }
    }
}

impl Drop for OcrAdapter {
    fn drop(&mut self) {
        // Closing the request channel lets the worker exit its recv loop
        let (dead_tx, _) = channel();
        self.request_tx = dead_tx;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    struct SlowRecognizer {
        delay: Duration,
    }

    impl TextRecognizer for SlowRecognizer {
        fn recognize(&mut self, _image: &GrayImage) -> Result<Vec<OcrFragment>> {
            std::thread::sleep(self.delay);
            Ok(vec![OcrFragment {
                text: "late".to_string(),
                left: 0,
                top: 0,
                width: 10,
                height: 10,
            }])
        }
    }

    struct CountingRecognizer {
        calls: u32,
        succeed_on: u32,
    }

    impl TextRecognizer for CountingRecognizer {
        fn recognize(&mut self, _image: &GrayImage) -> Result<Vec<OcrFragment>> {
            self.calls += 1;
            if self.calls >= self.succeed_on {
                Ok(vec![OcrFragment {
                    text: "Legendary".to_string(),
                    left: 5,
                    top: 5,
                    width: 60,
                    height: 12,
                }])
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn frame() -> Frame {
        ImageBuffer::from_pixel(20, 20, Rgba([128, 128, 128, 255]))
    }

    #[test]
    fn test_timeout_expires_for_slow_engine() {
        let slow = SlowRecognizer { delay: Duration::from_millis(500) };
        let mut adapter = OcrAdapter::new(Box::new(slow), Duration::from_millis(50));

        let result = adapter.recognize_timeout(GrayImage::new(4, 4));
        assert!(result.is_err());
    }

    #[test]
    fn test_late_answer_not_mistaken_for_next() {
        let slow = SlowRecognizer { delay: Duration::from_millis(150) };
        let mut adapter = OcrAdapter::new(Box::new(slow), Duration::from_millis(50));

        assert!(adapter.recognize_timeout(GrayImage::new(4, 4)).is_err());

        // Give the worker time to finish the first request and queue its
        // stale response, then ask again with a budget the engine can meet
        std::thread::sleep(Duration::from_millis(200));
        adapter.timeout = Duration::from_millis(1000);
        let result = adapter.recognize_timeout(GrayImage::new(4, 4)).expect("ok");
        assert_eq!(result[0].text, "late");
    }

    #[test]
    fn test_ladder_retries_until_text_appears() {
        let counting = CountingRecognizer { calls: 0, succeed_on: 3 };
        let mut adapter = OcrAdapter::new(Box::new(counting), Duration::from_millis(500));

        let fragments = adapter.read_fragments(&frame()).expect("fragments");
        assert_eq!(fragments[0].text, "Legendary");
    }

    #[test]
    fn test_ladder_gives_up_after_enhanced_attempt() {
        let counting = CountingRecognizer { calls: 0, succeed_on: 99 };
        let mut adapter = OcrAdapter::new(Box::new(counting), Duration::from_millis(500));

        assert!(adapter.read_fragments(&frame()).is_none());
    }
}
