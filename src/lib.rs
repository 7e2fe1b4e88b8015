//! Fishing automation core.
//!
//! Reads game state from screen pixels and drives the fishing minigame
//! through host-provided capture and input channels. The host embeds this
//! crate, supplies a [`capture::CaptureProvider`], an
//! [`input::ActuationChannel`] and optionally a [`ocr::TextRecognizer`],
//! then starts the cycle worker via [`cycle::runner::start`].

pub mod bait;
pub mod capture;
pub mod config;
pub mod cycle;
pub mod events;
pub mod input;
pub mod ocr;
pub mod servo;
pub mod timing;
pub mod vision;

#[cfg(test)]
pub(crate) mod testutil;

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

static SESSION_LOG: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Logs a message to the console and, if set, the session log file with timestamp.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);
    if let Ok(guard) = SESSION_LOG.lock() {
        if let Some(path) = guard.as_ref() {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = file.write_all(line.as_bytes());
            }
        }
    }
}

/// Sets or clears the session log file that [`log`] appends to.
pub fn set_session_log(path: Option<PathBuf>) {
    if let Ok(mut guard) = SESSION_LOG.lock() {
        *guard = path;
    }
}
