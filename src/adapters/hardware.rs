//! Simulated hardware — every collaborator port on a host.
//!
//! Combines a motion model (base angle that advances while scanning), a
//! tone/pump model, and a camera that sees the fires placed in the scene.
//! Each fire needs a fixed number of suppression hits before it goes out.
//! The live detection stream comes from a [`DetectionFeed`].  Tone and
//! spray run in short slices and cut out as soon as the emergency stop
//! latch engages.
//!
//! This is the only module in the host build that "touches hardware".

use std::sync::{Arc, Mutex};

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use super::detection_feed::DetectionFeed;
use super::time::MonotonicClock;
use crate::app::ports::{DetectionPort, Frame, MotionPort, SuppressionPort, TimePort};
use crate::error::HardwareError;
use crate::estop::EmergencyStop;
use crate::fsm::context::Detection;
use crate::queue::angular_distance;

/// A fire in the simulated scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SimFire {
    pub sector_deg: f32,
    pub elevation_deg: f32,
    pub confidence: f32,
    /// Tone or spray hits still needed to put it out.
    pub hits_remaining: u8,
}

/// Scene shared between the operator console and the simulator.
pub type Scene = Arc<Mutex<Vec<SimFire>>>;

/// Longest stretch an actuator runs without checking the e-stop.
const ESTOP_POLL_MS: u32 = 20;

pub struct SimHardware {
    clock: MonotonicClock,
    feed: DetectionFeed,
    scene: Scene,
    estop: Arc<EmergencyStop>,
    /// Camera half-width used to decide what a frame can see.
    field_of_view_deg: f32,
    /// Base rotation speed while scanning (deg per ms).
    scan_deg_per_ms: f32,
    angle_deg: f32,
    scanning_since_ms: Option<u64>,
    aimed_at: Option<f32>,
    tone_on: bool,
    pump_on: bool,
}

impl SimHardware {
    /// `clock` should be shared with the watchdog so both use one time base.
    pub fn new(
        clock: MonotonicClock,
        feed: DetectionFeed,
        scene: Scene,
        estop: Arc<EmergencyStop>,
        rpm: f32,
        sector_size_deg: f32,
    ) -> Self {
        Self {
            clock,
            feed,
            scene,
            estop,
            field_of_view_deg: sector_size_deg / 2.0,
            scan_deg_per_ms: rpm * 360.0 / 60_000.0,
            angle_deg: 0.0,
            scanning_since_ms: None,
            aimed_at: None,
            tone_on: false,
            pump_on: false,
        }
    }

    /// Run an actuator for `duration_ms`.  Returns `false` if the e-stop
    /// cut it short.
    fn run_for(&mut self, duration_ms: u32) -> bool {
        let mut left = duration_ms;
        while left > 0 {
            if self.estop.is_engaged() {
                return false;
            }
            let step = left.min(ESTOP_POLL_MS);
            self.clock.delay_ms(step);
            left -= step;
        }
        !self.estop.is_engaged()
    }

    /// Apply one suppression hit to the fire the arm is pointed at.
    fn hit(&mut self) {
        let Some(aim) = self.aimed_at else {
            return;
        };
        let Ok(mut scene) = self.scene.lock() else {
            return;
        };
        let fov = self.field_of_view_deg;
        if let Some(fire) = scene
            .iter_mut()
            .find(|f| angular_distance(f.sector_deg, aim) <= fov)
        {
            fire.hits_remaining = fire.hits_remaining.saturating_sub(1);
            debug!(
                "Sim: fire at {:.1}° hit, {} remaining",
                fire.sector_deg, fire.hits_remaining
            );
        }
        scene.retain(|f| f.hits_remaining > 0);
    }
}

// ── MotionPort ────────────────────────────────────────────────

impl MotionPort for SimHardware {
    fn start_continuous_scan(&mut self) {
        self.aimed_at = None;
        self.scanning_since_ms = Some(self.clock.now_ms());
    }

    fn stop_scan(&mut self) {
        self.angle_deg = self.current_angle();
        self.scanning_since_ms = None;
    }

    fn rotate_to(&mut self, angle_deg: f32) -> Result<(), HardwareError> {
        if !angle_deg.is_finite() {
            return Err(HardwareError::Motion);
        }
        self.scanning_since_ms = None;
        self.angle_deg = angle_deg.rem_euclid(360.0);
        Ok(())
    }

    fn current_angle(&self) -> f32 {
        match self.scanning_since_ms {
            Some(since) => {
                let elapsed = self.clock.now_ms().saturating_sub(since) as f32;
                (self.angle_deg + elapsed * self.scan_deg_per_ms).rem_euclid(360.0)
            }
            None => self.angle_deg,
        }
    }

    fn aim(&mut self, azimuth_deg: f32, elevation_deg: f32) -> Result<(), HardwareError> {
        if !(-90.0..=90.0).contains(&elevation_deg) {
            return Err(HardwareError::Motion);
        }
        self.aimed_at = Some(azimuth_deg);
        info!("Sim: arm aimed at {:.1}° / {:.1}°", azimuth_deg, elevation_deg);
        Ok(())
    }

    fn return_to_neutral(&mut self) -> Result<(), HardwareError> {
        self.aimed_at = None;
        Ok(())
    }
}

// ── SuppressionPort ───────────────────────────────────────────

impl SuppressionPort for SimHardware {
    fn play_tone(&mut self, duration_ms: u32) -> Result<(), HardwareError> {
        self.tone_on = true;
        let finished = self.run_for(duration_ms);
        self.tone_on = false;
        if !finished {
            warn!("Sim: tone cut by emergency stop");
            return Err(HardwareError::Tone);
        }
        self.hit();
        Ok(())
    }

    fn stop_tone(&mut self) {
        self.tone_on = false;
    }

    fn spray(&mut self, duration_ms: u32) -> Result<(), HardwareError> {
        self.pump_on = true;
        let finished = self.run_for(duration_ms);
        self.pump_on = false;
        if !finished {
            warn!("Sim: pump cut by emergency stop");
            return Err(HardwareError::Spray);
        }
        self.hit();
        Ok(())
    }

    fn stop_spray(&mut self) {
        self.pump_on = false;
    }
}

// ── DetectionPort ─────────────────────────────────────────────

impl DetectionPort for SimHardware {
    fn poll_detection(&mut self) -> Option<Detection> {
        self.feed.poll()
    }

    fn sample_at(&mut self, sector_deg: f32) -> Result<Frame, HardwareError> {
        let now = self.clock.now_ms();
        let scene = self.scene.lock().map_err(|_| HardwareError::Camera)?;
        let mut frame = Frame::new();
        for fire in scene
            .iter()
            .filter(|f| angular_distance(f.sector_deg, sector_deg) <= self.field_of_view_deg)
        {
            let det = Detection::new(fire.sector_deg, fire.confidence, now)
                .with_elevation(fire.elevation_deg);
            if frame.push(det).is_err() {
                break;
            }
        }
        Ok(frame)
    }
}

// ── Time ──────────────────────────────────────────────────────

impl TimePort for SimHardware {
    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

impl DelayNs for SimHardware {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.delay_ns(ns);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock.delay_ms(ms);
    }
}
