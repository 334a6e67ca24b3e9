use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Pause and stop flags shared between the session loop and whatever drives it.
///
/// Setters may be called from any thread. The loop samples the flags only at
/// trial boundaries.
#[derive(Debug, Clone, Default)]
pub struct SessionControl {
    pause: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl SessionControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn pause_requested(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}
