//! Mock hardware adapter for integration tests.
//!
//! A manual clock that only moves when the controller waits or actuates,
//! a tiny fire model the camera reports on, scripted failures, and a
//! record of every port call so tests can assert on the full history.

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use aipawe::app::events::AppEvent;
use aipawe::app::ports::{
    DetectionPort, EventSink, Frame, MessagingPort, MotionPort, SuppressionPort, TimePort,
};
use aipawe::app::service::{ControllerLinks, SuppressionController};
use aipawe::config::SystemConfig;
use aipawe::config_store::ConfigStore;
use aipawe::error::HardwareError;
use aipawe::fsm::StateId;
use aipawe::fsm::context::Detection;
use aipawe::notify::{NotificationEvent, Notifier};
use aipawe::queue::angular_distance;
use aipawe::watchdog::{StateClock, StuckSignal, WatchdogTimer};
use embedded_hal::delay::DelayNs;

// ── Call record ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum HwCall {
    StartScan,
    StopScan,
    RotateTo(f32),
    Aim(f32, f32),
    Tone(u32),
    StopTone,
    Spray(u32),
    StopSpray,
    Sample(f32),
    Neutral,
    Delay(u32),
}

// ── Fire model ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MockFire {
    pub sector_deg: f32,
    pub confidence: f32,
    /// Tone or spray hits still needed.  `u32::MAX` never goes out.
    pub hits: u32,
}

/// Half-width of what one camera frame sees.
const VIEW_DEG: f32 = 30.0;

/// A spray that blocks past the watchdog timeout while a watchdog on
/// another timeline keeps checking the shared state clock.
pub struct HangingSpray {
    clock: Arc<StateClock>,
    signal: Arc<StuckSignal>,
    timer: WatchdogTimer,
    timeout_ms: u32,
    /// What the state clock said while the spray was stuck.
    pub seen: Option<(StateId, u64)>,
    pub raised: bool,
}

impl HangingSpray {
    pub fn new(links: &ControllerLinks, timeout_ms: u32) -> Self {
        Self {
            clock: Arc::clone(&links.clock),
            signal: Arc::clone(&links.stuck),
            timer: WatchdogTimer::new(),
            timeout_ms,
            seen: None,
            raised: false,
        }
    }
}

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    pub now: Cell<u64>,
    pub calls: Vec<HwCall>,
    pub fires: Vec<MockFire>,
    /// Served one per `poll_detection`.
    pub detections: VecDeque<Detection>,
    pub fail_aim: bool,
    pub fail_tone: bool,
    pub fail_spray: bool,
    pub fail_camera: bool,
    pub hang_spray: Option<HangingSpray>,
    aimed_at: Option<f32>,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self {
            now: Cell::new(0),
            calls: Vec::new(),
            fires: Vec::new(),
            detections: VecDeque::new(),
            fail_aim: false,
            fail_tone: false,
            fail_spray: false,
            fail_camera: false,
            hang_spray: None,
            aimed_at: None,
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    /// Add a fire and report it on the detection stream.
    pub fn ignite(&mut self, sector_deg: f32, confidence: f32, hits: u32) {
        self.fires.push(MockFire {
            sector_deg,
            confidence,
            hits,
        });
        self.detect(sector_deg, confidence);
    }

    /// Queue a detection without placing a fire.
    pub fn detect(&mut self, sector_deg: f32, confidence: f32) {
        let det = Detection::new(sector_deg, confidence, self.now.get());
        self.detections.push_back(det);
    }

    pub fn count(&self, pred: impl Fn(&HwCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn hit(&mut self) {
        let Some(aim) = self.aimed_at else {
            return;
        };
        if let Some(fire) = self
            .fires
            .iter_mut()
            .find(|f| angular_distance(f.sector_deg, aim) <= 1.0)
        {
            fire.hits = fire.hits.saturating_sub(1);
        }
        self.fires.retain(|f| f.hits > 0);
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionPort for MockHardware {
    fn start_continuous_scan(&mut self) {
        self.calls.push(HwCall::StartScan);
    }

    fn stop_scan(&mut self) {
        self.calls.push(HwCall::StopScan);
    }

    fn rotate_to(&mut self, angle_deg: f32) -> Result<(), HardwareError> {
        self.calls.push(HwCall::RotateTo(angle_deg));
        if self.fail_aim {
            return Err(HardwareError::Motion);
        }
        Ok(())
    }

    fn current_angle(&self) -> f32 {
        self.aimed_at.unwrap_or(0.0)
    }

    fn aim(&mut self, azimuth_deg: f32, elevation_deg: f32) -> Result<(), HardwareError> {
        self.calls.push(HwCall::Aim(azimuth_deg, elevation_deg));
        self.aimed_at = Some(azimuth_deg);
        Ok(())
    }

    fn return_to_neutral(&mut self) -> Result<(), HardwareError> {
        self.calls.push(HwCall::Neutral);
        self.aimed_at = None;
        Ok(())
    }
}

impl SuppressionPort for MockHardware {
    fn play_tone(&mut self, duration_ms: u32) -> Result<(), HardwareError> {
        self.calls.push(HwCall::Tone(duration_ms));
        if self.fail_tone {
            return Err(HardwareError::Tone);
        }
        self.advance(u64::from(duration_ms));
        self.hit();
        Ok(())
    }

    fn stop_tone(&mut self) {
        self.calls.push(HwCall::StopTone);
    }

    fn spray(&mut self, duration_ms: u32) -> Result<(), HardwareError> {
        self.calls.push(HwCall::Spray(duration_ms));
        if self.fail_spray {
            return Err(HardwareError::Spray);
        }
        if let Some(hang) = self.hang_spray.as_mut() {
            let now = self.now.get() + u64::from(hang.timeout_ms) + 1_000;
            self.now.set(now);
            hang.seen = Some(hang.clock.read());
            hang.raised |= hang
                .timer
                .check(&hang.clock, now, hang.timeout_ms, &hang.signal);
        }
        self.advance(u64::from(duration_ms));
        self.hit();
        Ok(())
    }

    fn stop_spray(&mut self) {
        self.calls.push(HwCall::StopSpray);
    }
}

impl DetectionPort for MockHardware {
    fn poll_detection(&mut self) -> Option<Detection> {
        self.detections.pop_front()
    }

    fn sample_at(&mut self, sector_deg: f32) -> Result<Frame, HardwareError> {
        self.calls.push(HwCall::Sample(sector_deg));
        if self.fail_camera {
            return Err(HardwareError::Camera);
        }
        let now = self.now.get();
        let mut frame = Frame::new();
        for fire in self
            .fires
            .iter()
            .filter(|f| angular_distance(f.sector_deg, sector_deg) <= VIEW_DEG)
        {
            let _ = frame.push(Detection::new(fire.sector_deg, fire.confidence, now));
        }
        Ok(frame)
    }
}

impl TimePort for MockHardware {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

impl DelayNs for MockHardware {
    fn delay_ns(&mut self, ns: u32) {
        self.advance(u64::from(ns / 1_000_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.calls.push(HwCall::Delay(ms));
        self.advance(u64::from(ms));
    }
}

// ── LogSink ───────────────────────────────────────────────────

#[derive(Default)]
pub struct LogSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> Vec<StateId> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Recorder notifier ─────────────────────────────────────────

#[derive(Default)]
pub struct Recorder {
    pub events: Vec<NotificationEvent>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn messages(&self) -> Vec<String> {
        self.events.iter().map(NotificationEvent::message).collect()
    }

    pub fn terminal_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.kind().is_terminal())
            .count()
    }
}

impl Notifier for Recorder {
    fn notify(&mut self, event: NotificationEvent) {
        self.events.push(event);
    }
}

// ── Messenger that records or fails ───────────────────────────

/// Cloneable so a test keeps a handle after moving one into the worker.
#[derive(Clone, Default)]
pub struct MockMessenger {
    pub sent: Arc<Mutex<Vec<String>>>,
    pub failures_left: Arc<Mutex<usize>>,
}

#[allow(dead_code)]
impl MockMessenger {
    pub fn failing(times: usize) -> Self {
        Self {
            sent: Arc::default(),
            failures_left: Arc::new(Mutex::new(times)),
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl MessagingPort for MockMessenger {
    fn send(&mut self, text: &str) -> Result<(), HardwareError> {
        let mut left = self.failures_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return Err(HardwareError::Messaging);
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ── Rig: controller + mocks wired together ────────────────────

pub struct Rig {
    pub ctl: SuppressionController<Recorder>,
    pub hw: MockHardware,
    pub sink: LogSink,
    pub store: Arc<ConfigStore>,
}

#[allow(dead_code)]
impl Rig {
    pub fn new(config: SystemConfig) -> Self {
        let store = Arc::new(ConfigStore::new(config).expect("valid test config"));
        let links = ControllerLinks::new(Arc::clone(&store));
        let mut ctl = SuppressionController::new(links, Recorder::default());
        let mut hw = MockHardware::new();
        let mut sink = LogSink::new();
        ctl.start(&mut hw, &mut sink);
        Self {
            ctl,
            hw,
            sink,
            store,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SystemConfig::default())
    }

    pub fn tick(&mut self) {
        self.hw.advance(10);
        self.ctl.tick(&mut self.hw, &mut self.sink);
    }

    /// Tick until `state` is current.  Panics after `max` ticks.
    pub fn run_until(&mut self, state: StateId, max: usize) {
        for _ in 0..max {
            if self.ctl.state() == state {
                return;
            }
            self.tick();
        }
        assert_eq!(self.ctl.state(), state, "did not reach {state} in {max} ticks");
    }

    /// Tick until the controller is back in SCAN with nothing pending.
    pub fn run_to_idle(&mut self, max: usize) {
        for _ in 0..max {
            self.tick();
            if self.ctl.state() == StateId::Scan
                && self.ctl.status().pending_targets == 0
                && self.hw.detections.is_empty()
            {
                return;
            }
        }
        panic!("controller did not settle in {max} ticks: {:?}", self.ctl.status());
    }

    pub fn notes(&self) -> &Recorder {
        self.ctl.notifier()
    }
}
