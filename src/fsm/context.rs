//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the single struct that state handlers read from and
//! write to: the latest detector input, the outcome of the previous
//! hardware effect, the active episode, the effects requested for the
//! controller to carry out, and the configuration views.  Think of it as
//! the "blackboard" in a blackboard architecture.
//!
//! Handlers never call hardware.  They push [`Effect`]s; the controller
//! applies them through the ports and writes the outcome back into
//! [`ControlInputs`] before the next tick.

use std::sync::Arc;

use heapless::Vec;
use log::error;

use crate::config_store::ConfigSnapshot;
use crate::error::HardwareError;
use crate::notify::NotificationEvent;
use crate::queue::{SuppressionMethod, Target, TargetQueue};

// ---------------------------------------------------------------------------
// Detector record (read-only to state handlers; produced by the detector)
// ---------------------------------------------------------------------------

/// One fire sighting.  Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Absolute sector angle of the fire (degrees, `[0, 360)`).
    pub sector_angle: f32,
    /// Elevation below the horizon the arm must aim at (degrees).
    pub elevation_deg: f32,
    /// Detector confidence (0–1).
    pub confidence: f32,
    /// Capture time on the controller's monotonic clock (ms).
    pub timestamp_ms: u64,
}

impl Detection {
    pub fn new(sector_angle: f32, confidence: f32, timestamp_ms: u64) -> Self {
        Self {
            sector_angle: sector_angle.rem_euclid(360.0),
            elevation_deg: 0.0,
            confidence,
            timestamp_ms,
        }
    }

    /// `true` when the confidence is a real number at or above `floor`.
    /// NaN never qualifies.
    pub fn meets(&self, floor: f32) -> bool {
        self.confidence.is_finite() && self.confidence >= floor
    }

    pub fn with_elevation(mut self, elevation_deg: f32) -> Self {
        self.elevation_deg = elevation_deg;
        self
    }
}

// ---------------------------------------------------------------------------
// Effects (written by state handlers; applied by the controller)
// ---------------------------------------------------------------------------

/// Upper bound on effects a single transition can request.
pub const MAX_EFFECTS: usize = 8;

/// A hardware or notification action requested by a state handler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    StartScan,
    StopScan,
    /// Rotate the base to the sector, then aim the arm.
    Aim { sector_deg: f32, elevation_deg: f32 },
    /// Block for the given time (interlock gap or settle delay).
    Wait { ms: u32 },
    PlayTone { duration_ms: u32 },
    StopTone,
    Spray { duration_ms: u32 },
    StopSpray,
    /// Re-sample the detector and decide whether the fire is still there.
    Resample {
        sector_deg: f32,
        tolerance_deg: f32,
        min_confidence: f32,
    },
    ReturnToNeutral,
    Notify(NotificationEvent),
}

pub type Effects = Vec<Effect, MAX_EFFECTS>;

// ---------------------------------------------------------------------------
// Inputs (written by the controller; consumed by state handlers)
// ---------------------------------------------------------------------------

/// Result of the last blocking actuation (aim, tone, spray).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    Failed(HardwareError),
}

/// Result of a verification re-sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    FireGone,
    FirePersists,
    SampleFailed(HardwareError),
}

impl VerifyOutcome {
    /// A failed sample counts the same as a fire that is still burning.
    pub fn fire_present(self) -> bool {
        !matches!(self, Self::FireGone)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ControlInputs {
    /// Detection pulled from the live stream this tick (SCAN only).
    pub detection: Option<Detection>,
    pub action: Option<ActionOutcome>,
    pub verify: Option<VerifyOutcome>,
}

// ---------------------------------------------------------------------------
// Episode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeOutcome {
    Suppressed(SuppressionMethod),
    Failed,
}

/// One suppression episode: DETECT through RETURN for a single target.
#[derive(Debug, Clone)]
pub struct Episode {
    pub id: u64,
    /// Snapshot captured at episode start; governs attempt limits until REPORT.
    pub config: Arc<ConfigSnapshot>,
    pub target: Target,
    /// Sound + water (+ failed aim) attempts spent so far.
    pub attempts: u32,
    pub outcome: Option<EpisodeOutcome>,
}

impl Episode {
    /// Spend one attempt, optionally charged to a method.
    pub fn spend_attempt(&mut self, method: Option<SuppressionMethod>) {
        self.attempts += 1;
        match method {
            Some(SuppressionMethod::Sound) => self.target.sound_attempts += 1,
            Some(SuppressionMethod::Water) => self.target.water_attempts += 1,
            Some(SuppressionMethod::None) | None => {}
        }
        if let Some(m) = method {
            self.target.method_attempted = m;
        }
        self.target.attempt_count = self.attempts;
    }

    pub fn total_exhausted(&self) -> bool {
        self.attempts >= u32::from(self.config.config.safety.max_total_attempts)
    }

    pub fn sound_available(&self) -> bool {
        !self.total_exhausted()
            && self.target.sound_attempts < u32::from(self.config.config.audio.max_attempts)
    }

    pub fn water_available(&self) -> bool {
        !self.total_exhausted()
            && self.target.water_attempts < u32::from(self.config.config.water.max_attempts)
    }
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct FsmContext {
    // -- Timing --
    /// Controller clock at the start of the current tick (ms).
    pub now_ms: u64,
    /// When the current state was entered (ms).  Watched by the watchdog.
    pub state_entered_at_ms: u64,
    /// End of the most recent tone or spray (ms).  Drives the interlock.
    pub last_actuation_end_ms: Option<u64>,

    // -- Configuration --
    /// Latest published config, refreshed every tick.
    pub live: Arc<ConfigSnapshot>,

    // -- Targets --
    pub queue: Arc<TargetQueue>,
    pub episode: Option<Episode>,
    next_episode_id: u64,

    // -- I/O --
    pub inputs: ControlInputs,
    pub effects: Effects,
}

impl FsmContext {
    pub fn new(live: Arc<ConfigSnapshot>, queue: Arc<TargetQueue>) -> Self {
        Self {
            now_ms: 0,
            state_entered_at_ms: 0,
            last_actuation_end_ms: None,
            live,
            queue,
            episode: None,
            next_episode_id: 1,
            inputs: ControlInputs::default(),
            effects: Effects::new(),
        }
    }

    /// Request an effect.  Overflow is a table bug, not a runtime condition.
    pub fn effect(&mut self, effect: Effect) {
        if let Err(dropped) = self.effects.push(effect) {
            debug_assert!(false, "effect list overflow: {dropped:?}");
            error!("FSM: effect list full, dropping {:?}", dropped);
        }
    }

    /// Hand the pending effects to the controller.
    pub fn take_effects(&mut self) -> Effects {
        core::mem::take(&mut self.effects)
    }

    /// Open an episode for a freshly dequeued target, pinning the live config.
    pub fn begin_episode(&mut self, target: Target) {
        let id = self.next_episode_id;
        self.next_episode_id += 1;
        self.episode = Some(Episode {
            id,
            config: Arc::clone(&self.live),
            target,
            attempts: 0,
            outcome: None,
        });
    }

    /// Close the active episode and release its target slot in the queue.
    pub fn end_episode(&mut self) -> Option<Episode> {
        let ep = self.episode.take();
        if ep.is_some() {
            self.queue.release_active();
        }
        ep
    }

    /// Milliseconds still owed to the interlock before the next actuation.
    pub fn interlock_remaining_ms(&self) -> u32 {
        let gap = u64::from(self.live.config.safety.interlock_delay_ms);
        match self.last_actuation_end_ms {
            Some(end) => {
                let elapsed = self.now_ms.saturating_sub(end);
                gap.saturating_sub(elapsed) as u32
            }
            None => 0,
        }
    }
}
