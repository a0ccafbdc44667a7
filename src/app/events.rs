//! Outbound application events.
//!
//! The [`SuppressionController`](super::service::SuppressionController)
//! emits these through the [`EventSink`](super::ports::EventSink) port.
//! Adapters on the other side decide what to do with them — log them,
//! publish them, or record them in a test.

use crate::error::StuckState;
use crate::fsm::context::EpisodeOutcome;
use crate::fsm::{StateId, TransitionReason};

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The controller has started (carries initial state).
    Started(StateId),

    /// The FSM transitioned between states.
    StateChanged {
        from: StateId,
        to: StateId,
        reason: TransitionReason,
    },

    /// A target was dequeued and an episode opened.
    EpisodeStarted { episode: u64, sector_deg: f32 },

    /// An episode reached REPORT.
    EpisodeFinished {
        episode: u64,
        outcome: EpisodeOutcome,
        attempts: u32,
    },

    /// The watchdog aborted an episode; its target was discarded.
    WatchdogAbort(StuckState),

    EmergencyStop,
    Resumed,

    /// A new config version took effect in the controller.
    ConfigApplied { version: u64 },
}

/// A point-in-time view of the controller, for logging or an operator console.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub state: StateId,
    pub halted: bool,
    pub pending_targets: usize,
    pub episode: Option<u64>,
    pub active_sector_deg: Option<f32>,
    pub attempts_this_episode: u32,
    pub config_version: u64,
    pub tick_count: u64,
}
