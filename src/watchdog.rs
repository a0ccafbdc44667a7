//! State-dwell watchdog.
//!
//! The controller publishes `(state, entered_at)` to a shared
//! [`StateClock`] on every transition, before that state's hardware calls
//! run, so a call that never returns is charged to the state that made it.
//! A [`WatchdogTimer`] on its own
//! timeline compares that entry time against `watchdog_timeout_ms` and,
//! when a policed state has been held too long, raises a [`StuckState`]
//! through the [`StuckSignal`].  The controller consumes the signal at the
//! top of its next tick and forces RETURN.
//!
//! SCAN and HALTED are never policed: scanning is the resting state and
//! a halt is held deliberately until an operator resumes.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::error;

use crate::error::StuckState;
use crate::fsm::StateId;

/// Single-slot mailbox from the watchdog to the controller.
pub type StuckSignal = Signal<CriticalSectionRawMutex, StuckState>;

/// Current state and its entry time, readable from any thread.
pub struct StateClock {
    inner: Mutex<CriticalSectionRawMutex, Cell<(StateId, u64)>>,
}

impl StateClock {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new((StateId::Scan, 0))),
        }
    }

    pub fn publish(&self, state: StateId, entered_at_ms: u64) {
        self.inner.lock(|c| c.set((state, entered_at_ms)));
    }

    pub fn read(&self) -> (StateId, u64) {
        self.inner.lock(Cell::get)
    }
}

impl Default for StateClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Raises at most once per state entry.
#[derive(Debug, Default)]
pub struct WatchdogTimer {
    raised_for: Option<(StateId, u64)>,
}

impl WatchdogTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure check: has `state`, entered at `entered_at_ms`, outlived
    /// `timeout_ms` at `now_ms`?
    pub fn poll(
        &mut self,
        state: StateId,
        entered_at_ms: u64,
        now_ms: u64,
        timeout_ms: u32,
    ) -> Option<StuckState> {
        if state.is_resting() {
            self.raised_for = None;
            return None;
        }
        if self.raised_for == Some((state, entered_at_ms)) {
            return None;
        }

        let held_ms = now_ms.saturating_sub(entered_at_ms);
        if held_ms <= u64::from(timeout_ms) {
            return None;
        }

        self.raised_for = Some((state, entered_at_ms));
        Some(StuckState {
            state,
            entered_at_ms,
            held_ms,
        })
    }

    /// Poll the shared clock and signal the controller if stuck.
    /// Returns `true` when a signal was raised.
    pub fn check(
        &mut self,
        clock: &StateClock,
        now_ms: u64,
        timeout_ms: u32,
        signal: &StuckSignal,
    ) -> bool {
        let (state, entered_at_ms) = clock.read();
        match self.poll(state, entered_at_ms, now_ms, timeout_ms) {
            Some(stuck) => {
                error!("Watchdog: {}", stuck);
                signal.signal(stuck);
                true
            }
            None => false,
        }
    }
}
