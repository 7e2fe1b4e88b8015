//! Worker thread lifecycle.
//!
//! The orchestrator runs on one dedicated thread. Errors escaping a stage
//! are caught exactly once here: release the button, surface a status, stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::timing::CancelToken;

use super::{CycleDeps, Orchestrator};

/// Handle to a running cycle worker. Dropping it stops the worker.
pub struct WorkerHandle {
    cancel: CancelToken,
    running: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Requests a stop and waits for the worker to exit.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns the cycle worker thread.
pub fn start(deps: CycleDeps) -> WorkerHandle {
    let cancel = CancelToken::new();
    let running = Arc::new(AtomicBool::new(true));

    let events = deps.events.clone();
    let worker_cancel = cancel.clone();
    let worker_running = running.clone();

    let join = std::thread::spawn(move || {
        let mut orchestrator = Orchestrator::new(deps, worker_cancel);
        loop {
            match orchestrator.step() {
                Ok(true) => {}
                Ok(false) => {
                    crate::log("Cycle worker stopped");
                    break;
                }
                Err(e) => {
                    orchestrator.shutdown();
                    crate::log(&format!("Cycle worker halted on error: {}", e));
                    events.on_status(&format!("Stopped on error: {}", e));
                    break;
                }
            }
        }
        orchestrator.shutdown();
        worker_running.store(false, Ordering::SeqCst);
    });

    WorkerHandle {
        cancel,
        running,
        join: Some(join),
    }
}
