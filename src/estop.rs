//! Emergency stop latch.
//!
//! Any thread (operator console, hardware button handler) may engage or
//! release it.  The controller samples it at the top of every tick, ahead
//! of the watchdog and the FSM, so an engaged stop wins over everything.

use core::sync::atomic::{AtomicBool, Ordering};

use log::warn;

#[derive(Debug, Default)]
pub struct EmergencyStop {
    engaged: AtomicBool,
}

impl EmergencyStop {
    pub const fn new() -> Self {
        Self {
            engaged: AtomicBool::new(false),
        }
    }

    pub fn engage(&self) {
        if !self.engaged.swap(true, Ordering::SeqCst) {
            warn!("EmergencyStop: engaged");
        }
    }

    /// Clear the latch.  The controller resumes in SCAN on its next tick.
    pub fn release(&self) {
        if self.engaged.swap(false, Ordering::SeqCst) {
            warn!("EmergencyStop: released");
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }
}
