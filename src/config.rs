//! System configuration parameters
//!
//! All tunable parameters for the suppression engine, grouped in the same
//! sections as the on-disk config file.  Every section defaults field by
//! field, so a file only needs to name the knobs it changes.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Core system configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub scan: ScanConfig,
    pub detection: DetectionConfig,
    pub audio: AudioConfig,
    pub water: WaterConfig,
    pub safety: SafetyConfig,
    pub state_machine: StateMachineConfig,
    pub notification: NotificationConfig,
}

/// Continuous 360° scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Base rotation speed while scanning (revolutions per minute)
    pub rpm: f32,
    /// Angular width covered by one camera frame (degrees)
    pub sector_size_deg: f32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            rpm: 2.0,
            sector_size_deg: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Confidence (0-1) at which a detection triggers an episode
    pub confidence_threshold: f32,
    /// Detections closer than this (degrees) are the same physical fire
    pub merge_tolerance_deg: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.65,
            merge_tolerance_deg: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sound attempts allowed per episode
    pub max_attempts: u8,
    /// Suppression tone length (milliseconds)
    pub duration_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            duration_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterConfig {
    /// Water attempts allowed per episode
    pub max_attempts: u8,
    /// Pump-on time per attempt (milliseconds)
    pub spray_duration_ms: u32,
}

impl Default for WaterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            spray_duration_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Absolute confidence floor, independent of the trigger threshold
    pub min_confidence: f32,
    /// Sound + water attempts allowed per episode
    pub max_total_attempts: u8,
    /// Minimum gap between the end of one actuation and the next (milliseconds)
    pub interlock_delay_ms: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
            max_total_attempts: 5,
            interlock_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateMachineConfig {
    /// Longest any non-SCAN state may be held (milliseconds)
    pub watchdog_timeout_ms: u32,
    /// Settle time before a verification re-sample (milliseconds)
    pub verify_delay_ms: u32,
    /// Pause before moving the arm to neutral (milliseconds)
    pub return_delay_ms: u32,
    /// Control loop period (milliseconds)
    pub loop_interval_ms: u32,
    /// Pending targets the controller accepts before refusing new ones
    pub max_queue_size: u16,
    /// Config reload cadence (milliseconds)
    pub config_reload_interval_ms: u32,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout_ms: 300_000,
            verify_delay_ms: 2_000,
            return_delay_ms: 1_000,
            loop_interval_ms: 50,
            max_queue_size: 10,
            config_reload_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Send attempts per message before giving up
    pub max_send_attempts: u8,
    /// Wait between failed send attempts (milliseconds)
    pub retry_backoff_ms: u32,
    /// Minimum spacing between outbound messages (milliseconds)
    pub min_send_interval_ms: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_send_attempts: 3,
            retry_backoff_ms: 2_000,
            min_send_interval_ms: 1_000,
        }
    }
}

/// Upper bound on either per-method attempt cap.
const MAX_METHOD_ATTEMPTS: u8 = 20;
/// Upper bound on the interlock gap.
const MAX_INTERLOCK_MS: u32 = 10_000;

impl SystemConfig {
    /// Range- and invariant-check every field.
    ///
    /// Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let floats = [
            self.scan.rpm,
            self.scan.sector_size_deg,
            self.detection.confidence_threshold,
            self.detection.merge_tolerance_deg,
            self.safety.min_confidence,
        ];
        if floats.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::ValidationFailed("values must be finite"));
        }

        if self.scan.rpm <= 0.0 {
            return Err(ConfigError::ValidationFailed("scan.rpm must be > 0"));
        }
        if !(self.scan.sector_size_deg > 0.0 && self.scan.sector_size_deg <= 360.0) {
            return Err(ConfigError::ValidationFailed(
                "scan.sector_size_deg must be in (0, 360]",
            ));
        }
        if !(0.0..=180.0).contains(&self.detection.merge_tolerance_deg) {
            return Err(ConfigError::ValidationFailed(
                "detection.merge_tolerance_deg must be 0–180",
            ));
        }

        let threshold = self.detection.confidence_threshold;
        let floor = self.safety.min_confidence;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::ValidationFailed(
                "detection.confidence_threshold must be 0.0–1.0",
            ));
        }
        if !(0.0..=1.0).contains(&floor) {
            return Err(ConfigError::ValidationFailed(
                "safety.min_confidence must be 0.0–1.0",
            ));
        }
        if floor > threshold {
            return Err(ConfigError::ValidationFailed(
                "safety.min_confidence must not exceed detection.confidence_threshold",
            ));
        }

        if self.safety.max_total_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "safety.max_total_attempts must be >= 1",
            ));
        }
        if self.audio.max_attempts > MAX_METHOD_ATTEMPTS
            || self.water.max_attempts > MAX_METHOD_ATTEMPTS
        {
            return Err(ConfigError::ValidationFailed(
                "audio/water max_attempts must be <= 20",
            ));
        }
        if self.audio.duration_ms == 0 || self.water.spray_duration_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "audio.duration_ms and water.spray_duration_ms must be > 0",
            ));
        }
        if self.safety.interlock_delay_ms > MAX_INTERLOCK_MS {
            return Err(ConfigError::ValidationFailed(
                "safety.interlock_delay_ms must be <= 10000",
            ));
        }

        let sm = &self.state_machine;
        if sm.loop_interval_ms == 0 || sm.config_reload_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "state_machine intervals must be > 0",
            ));
        }
        if sm.watchdog_timeout_ms <= self.longest_state_dwell_ms() {
            return Err(ConfigError::ValidationFailed(
                "state_machine.watchdog_timeout_ms must exceed the longest state dwell",
            ));
        }

        if self.notification.max_send_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "notification.max_send_attempts must be >= 1",
            ));
        }

        Ok(())
    }

    /// Longest time a healthy run legitimately spends in one state.
    pub fn longest_state_dwell_ms(&self) -> u32 {
        let actuation = self.audio.duration_ms.max(self.water.spray_duration_ms)
            + self.safety.interlock_delay_ms;
        actuation
            .max(self.state_machine.verify_delay_ms)
            .max(self.state_machine.return_delay_ms)
    }
}
