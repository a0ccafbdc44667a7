//! Background timelines around the control loop.
//!
//! | Thread       | Role                                             |
//! |--------------|--------------------------------------------------|
//! | `cfg-reload` | Polls a [`ConfigSource`] into the [`ConfigStore`] |
//! | `watchdog`   | Polices state dwell through the [`StateClock`]    |
//! | `sms-out`    | Drains the notification outbox                   |
//!
//! Each thread owns its timing and shares only `Arc`s with the
//! controller, so a slow SMS send or a bad config file never stalls the
//! control loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};

use crate::app::ports::{ConfigSource, MessagingPort, TimePort};
use crate::config_store::ConfigStore;
use crate::error::{Error, Result};
use crate::notify::{OutboundMsg, Outbox, run_delivery_worker};
use crate::watchdog::{StateClock, StuckSignal, WatchdogTimer};

/// Shutdown is checked at least this often by every polling thread.
const POLL_STEP: Duration = Duration::from_millis(50);
/// Watchdog sampling period.
const WATCHDOG_PERIOD: Duration = Duration::from_millis(100);

/// Spawn a named thread.
pub fn spawn_named(
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>> {
    info!("Spawning '{}'", name);
    std::thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .map_err(|_| Error::Spawn(name))
}

/// Sleep for `total`, waking early if `stop` is raised.
fn nap(total: Duration, stop: &AtomicBool) {
    let mut left = total;
    while !left.is_zero() && !stop.load(Ordering::Relaxed) {
        let step = left.min(POLL_STEP);
        std::thread::sleep(step);
        left -= step;
    }
}

// ───────────────────────────────────────────────────────────────
// Thread bodies
// ───────────────────────────────────────────────────────────────

/// Reload on the cadence named by the live config until `stop`.
pub fn reload_loop(store: &ConfigStore, source: &dyn ConfigSource, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        let interval = store.current().config.state_machine.config_reload_interval_ms;
        nap(Duration::from_millis(u64::from(interval)), stop);
        if stop.load(Ordering::Relaxed) {
            break;
        }
        // Errors are logged by the store; the old snapshot stays live.
        let _ = store.reload(source);
    }
    info!("Config reloader stopped");
}

/// Sample the state clock until `stop`, raising `signal` when stuck.
pub fn watchdog_loop(
    time: &impl TimePort,
    clock: &StateClock,
    signal: &StuckSignal,
    store: &ConfigStore,
    stop: &AtomicBool,
) {
    let mut timer = WatchdogTimer::new();
    while !stop.load(Ordering::Relaxed) {
        let timeout = store.current().config.state_machine.watchdog_timeout_ms;
        timer.check(clock, time.now_ms(), timeout, signal);
        nap(WATCHDOG_PERIOD, stop);
    }
    info!("Watchdog stopped");
}

// ───────────────────────────────────────────────────────────────
// Runtime
// ───────────────────────────────────────────────────────────────

/// Owns the background threads and stops them together.
pub struct Runtime {
    stop: Arc<AtomicBool>,
    outbox: Arc<Outbox>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Runtime {
    pub fn new(outbox: Arc<Outbox>) -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            outbox,
            handles: Vec::new(),
        }
    }

    pub fn spawn_reloader<S>(&mut self, store: Arc<ConfigStore>, source: S) -> Result<()>
    where
        S: ConfigSource + Send + 'static,
    {
        let stop = Arc::clone(&self.stop);
        let handle = spawn_named("cfg-reload", move || reload_loop(&store, &source, &stop))?;
        self.handles.push(("cfg-reload", handle));
        Ok(())
    }

    pub fn spawn_watchdog<T>(
        &mut self,
        time: T,
        clock: Arc<StateClock>,
        signal: Arc<StuckSignal>,
        store: Arc<ConfigStore>,
    ) -> Result<()>
    where
        T: TimePort + Send + 'static,
    {
        let stop = Arc::clone(&self.stop);
        let handle = spawn_named("watchdog", move || {
            watchdog_loop(&time, &clock, &signal, &store, &stop)
        })?;
        self.handles.push(("watchdog", handle));
        Ok(())
    }

    pub fn spawn_notifier<M>(&mut self, messenger: M, store: Arc<ConfigStore>) -> Result<()>
    where
        M: MessagingPort + Send + 'static,
    {
        let outbox = Arc::clone(&self.outbox);
        let handle = spawn_named("sms-out", move || {
            run_delivery_worker(&outbox, messenger, &store)
        })?;
        self.handles.push(("sms-out", handle));
        Ok(())
    }

    /// Raise the stop flag, flush the outbox, and join every thread.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Blocks only while the outbox is full; the worker is still draining.
        futures_lite::future::block_on(self.outbox.send(OutboundMsg::Shutdown));
        for (name, handle) in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("Thread '{}' panicked", name);
            }
        }
        info!("Runtime stopped");
    }
}
