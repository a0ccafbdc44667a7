//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ SuppressionController (domain)
//! ```
//!
//! Driven adapters (motion, suppression actuators, camera, SMS modem,
//! config source, clock) implement these traits.  The
//! [`SuppressionController`](super::service::SuppressionController)
//! consumes them via generics, so the domain core never touches hardware
//! directly.
//!
//! Every actuation call reports success or failure with a
//! [`HardwareError`].  A failure is never fatal: the controller spends an
//! attempt and moves on.

use heapless::Vec;

use crate::error::HardwareError;
use crate::fsm::context::Detection;

/// Largest number of detections a single re-sampled frame may carry.
pub const MAX_FRAME_DETECTIONS: usize = 8;

/// Detections from one camera frame.
pub type Frame = Vec<Detection, MAX_FRAME_DETECTIONS>;

// ───────────────────────────────────────────────────────────────
// Motion port (domain → stepper base + servo arm)
// ───────────────────────────────────────────────────────────────

pub trait MotionPort {
    /// Resume continuous 360° rotation.
    fn start_continuous_scan(&mut self);

    /// Halt continuous rotation where it is.
    fn stop_scan(&mut self);

    /// Rotate the base to an absolute sector angle (degrees).
    fn rotate_to(&mut self, angle_deg: f32) -> Result<(), HardwareError>;

    /// Current base angle (degrees, `[0, 360)`).
    fn current_angle(&self) -> f32;

    /// Point the arm at the given azimuth / elevation (degrees).
    fn aim(&mut self, azimuth_deg: f32, elevation_deg: f32) -> Result<(), HardwareError>;

    /// Park the arm in its neutral pose.
    fn return_to_neutral(&mut self) -> Result<(), HardwareError>;
}

// ───────────────────────────────────────────────────────────────
// Suppression port (domain → speaker amplifier + pump relay)
// ───────────────────────────────────────────────────────────────

pub trait SuppressionPort {
    /// Play the low-frequency suppression tone; blocks for `duration_ms`.
    fn play_tone(&mut self, duration_ms: u32) -> Result<(), HardwareError>;

    fn stop_tone(&mut self);

    /// Run the pump; blocks for `duration_ms`.
    fn spray(&mut self, duration_ms: u32) -> Result<(), HardwareError>;

    fn stop_spray(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Detection port (camera + inference → domain)
// ───────────────────────────────────────────────────────────────

/// Bounded-latency pull interface over the detector's frame stream.
pub trait DetectionPort {
    /// Next detection from the live stream, or `None` for an empty frame.
    /// Never blocks longer than one frame period.
    fn poll_detection(&mut self) -> Option<Detection>;

    /// Capture a fresh frame pointed at `sector_deg` and return every
    /// detection in it.
    fn sample_at(&mut self, sector_deg: f32) -> Result<Frame, HardwareError>;
}

// ───────────────────────────────────────────────────────────────
// Messaging port (domain → GSM modem)
// ───────────────────────────────────────────────────────────────

/// Outbound SMS.  May be retried by the notification gateway.
pub trait MessagingPort {
    fn send(&mut self, text: &str) -> Result<(), HardwareError>;
}

// ───────────────────────────────────────────────────────────────
// Time port
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds since an arbitrary epoch (usually boot).
pub trait TimePort {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Config source port (raw config bytes → ConfigStore)
// ───────────────────────────────────────────────────────────────

/// Raw configuration as delivered by a [`ConfigSource`].
#[derive(Debug, Clone, PartialEq)]
pub enum RawConfig {
    /// JSON document text.
    Json(String),
    /// postcard-encoded `SystemConfig`.
    Postcard(std::vec::Vec<u8>),
}

/// Supplies raw configuration on demand for
/// [`ConfigStore::reload`](crate::config_store::ConfigStore::reload).
///
/// Implementations only fetch; parsing and validation belong to the store,
/// so a source can never publish an unvalidated config.
pub trait ConfigSource {
    fn fetch(&self) -> Result<RawConfig, ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigSource`] and config validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// No config found at the source.
    NotFound,
    /// The source could not be read.
    IoError,
    /// Config failed to deserialize.
    Corrupted(String),
    /// A config field failed range or invariant validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted(msg) => write!(f, "config corrupted: {}", msg),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
