//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the logger.  A telemetry or dashboard adapter would implement the same
//! trait.

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] as a one-line record.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={}", state);
            }
            AppEvent::StateChanged { from, to, reason } => {
                info!("STATE | {} -> {} | {}", from, to, reason);
            }
            AppEvent::EpisodeStarted {
                episode,
                sector_deg,
            } => {
                info!("EPISODE | #{} started | sector={:.1}", episode, sector_deg);
            }
            AppEvent::EpisodeFinished {
                episode,
                outcome,
                attempts,
            } => {
                info!(
                    "EPISODE | #{} finished | outcome={:?} | attempts={}",
                    episode, outcome, attempts
                );
            }
            AppEvent::WatchdogAbort(stuck) => {
                error!("WATCHDOG | {}", stuck);
            }
            AppEvent::EmergencyStop => {
                warn!("ESTOP | engaged");
            }
            AppEvent::Resumed => {
                info!("ESTOP | released, resuming");
            }
            AppEvent::ConfigApplied { version } => {
                info!("CONFIG | v{} applied", version);
            }
        }
    }
}
