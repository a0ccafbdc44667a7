//! Host time adapter.
//!
//! Monotonic milliseconds since construction, plus a blocking
//! [`DelayNs`] for interlock and settle waits.  Backed by
//! `std::time::Instant` and `std::thread::sleep`.

use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;

use crate::app::ports::TimePort;

#[derive(Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl TimePort for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl DelayNs for MonotonicClock {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}
