//! Error types for the AIPAWE controller.
//!
//! None of these terminate the control loop: the controller consumes
//! hardware failures as spent attempts and the watchdog payload as a
//! forced RETURN.  Config errors live with the config port.  Only the
//! runtime surfaces [`Error`], when a background thread cannot start.

use core::fmt;

use crate::fsm::StateId;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A background thread could not be started.
    Spawn(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(name) => write!(f, "failed to spawn {name} thread"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Hardware action failures
// ---------------------------------------------------------------------------

/// A collaborator call that reported failure.  Recoverable: the controller
/// treats it exactly like a verification that still shows fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareError {
    /// Base rotation, arm aim, or return-to-neutral failed.
    Motion,
    /// Suppression tone playback failed.
    Tone,
    /// Pump relay / spray failed.
    Spray,
    /// Camera frame capture or inference failed.
    Camera,
    /// Outbound SMS could not be sent.
    Messaging,
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Motion => write!(f, "motion command failed"),
            Self::Tone => write!(f, "tone playback failed"),
            Self::Spray => write!(f, "spray failed"),
            Self::Camera => write!(f, "camera sample failed"),
            Self::Messaging => write!(f, "message send failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Watchdog payload
// ---------------------------------------------------------------------------

/// Raised by the watchdog when a monitored state outlives its timeout.
///
/// Carries the entry timestamp so the controller can discard a signal that
/// refers to a state it has already left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckState {
    pub state: StateId,
    pub entered_at_ms: u64,
    pub held_ms: u64,
}

impl fmt::Display for StuckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "state {} held for {} ms (entered at {} ms)",
            self.state.name(),
            self.held_ms,
            self.entered_at_ms
        )
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;
