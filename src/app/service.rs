//! Application service — the hexagonal core.
//!
//! [`SuppressionController`] owns the FSM and its context.  Each tick it
//! samples the emergency stop and the watchdog, feeds one detection to the
//! FSM, runs the pure transition function, then carries out the requested
//! effects through the hardware ports.  Every transition is published to
//! the [`StateClock`] before its effects run.  All I/O flows through port traits
//! injected at call sites, making the whole controller testable with mock
//! adapters.
//!
//! ```text
//!   MotionPort      ◀──┐
//!   SuppressionPort ◀──┤  ┌──────────────────────────────┐ ──▶ EventSink
//!   DetectionPort   ──▶├──│     SuppressionController     │
//!   TimePort/Delay  ──▶┘  │  FSM · queue · config · wdog  │ ──▶ Notifier
//!                         └──────────────────────────────┘
//! ```

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::config_store::ConfigStore;
use crate::error::{HardwareError, StuckState};
use crate::estop::EmergencyStop;
use crate::fsm::context::{ActionOutcome, Effect, FsmContext, VerifyOutcome};
use crate::fsm::states::{build_state_table, ingest_detection};
use crate::fsm::{Fsm, StateId, TransitionReason, TransitionRecord};
use crate::notify::Notifier;
use crate::queue::{TargetQueue, angular_distance};
use crate::watchdog::{StateClock, StuckSignal};

use super::events::{AppEvent, ControllerStatus};
use super::ports::{DetectionPort, EventSink, MotionPort, SuppressionPort, TimePort};

// ───────────────────────────────────────────────────────────────
// Shared handles
// ───────────────────────────────────────────────────────────────

/// Everything the controller shares with the other timelines.
#[derive(Clone)]
pub struct ControllerLinks {
    pub store: Arc<ConfigStore>,
    pub queue: Arc<TargetQueue>,
    pub estop: Arc<EmergencyStop>,
    pub stuck: Arc<StuckSignal>,
    pub clock: Arc<StateClock>,
}

impl ControllerLinks {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        let tolerance = store.current().config.detection.merge_tolerance_deg;
        Self {
            store,
            queue: Arc::new(TargetQueue::new(tolerance)),
            estop: Arc::new(EmergencyStop::new()),
            stuck: Arc::new(StuckSignal::new()),
            clock: Arc::new(StateClock::new()),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// SuppressionController
// ───────────────────────────────────────────────────────────────

pub struct SuppressionController<N: Notifier> {
    fsm: Fsm,
    ctx: FsmContext,
    links: ControllerLinks,
    notifier: N,
    tick_count: u64,
}

impl<N: Notifier> SuppressionController<N> {
    /// Construct the controller.  Does **not** start the FSM — call
    /// [`start`](Self::start) next.
    pub fn new(links: ControllerLinks, notifier: N) -> Self {
        let ctx = FsmContext::new(links.store.current(), Arc::clone(&links.queue));
        let fsm = Fsm::new(build_state_table(), StateId::Scan);
        Self {
            fsm,
            ctx,
            links,
            notifier,
            tick_count: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter SCAN and start rotating.
    pub fn start<H>(&mut self, hw: &mut H, sink: &mut impl EventSink)
    where
        H: MotionPort + SuppressionPort + DetectionPort + TimePort + DelayNs,
    {
        self.ctx.now_ms = hw.now_ms();
        self.fsm.start(&mut self.ctx);
        self.publish_clock();
        self.apply_effects(hw);
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!(
            "SuppressionController started in {} (config v{})",
            self.fsm.current_state(),
            self.ctx.live.version
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle:
    /// config → e-stop → watchdog → detection → FSM → effects.
    ///
    /// The `hw` parameter satisfies every hardware port at once — this
    /// avoids a double mutable borrow while keeping the port boundary
    /// explicit.
    pub fn tick<H>(&mut self, hw: &mut H, sink: &mut impl EventSink)
    where
        H: MotionPort + SuppressionPort + DetectionPort + TimePort + DelayNs,
    {
        self.tick_count += 1;
        self.ctx.now_ms = hw.now_ms();

        // 1. Live config view, and anything the notifier held back
        self.refresh_config(sink);
        self.notifier.flush();

        // 2. Emergency stop — precedes every other transition
        if self.links.estop.is_engaged() {
            if self.fsm.current_state() != StateId::Halted {
                error!("Emergency stop in {}", self.fsm.current_state());
                self.force(StateId::Halted, TransitionReason::EmergencyStop, sink);
                sink.emit(&AppEvent::EmergencyStop);
                self.apply_effects(hw);
            }
            return;
        }
        if self.fsm.current_state() == StateId::Halted {
            // Anything the watchdog raised before the halt is stale.
            self.links.stuck.reset();
            self.force(StateId::Scan, TransitionReason::Resumed, sink);
            sink.emit(&AppEvent::Resumed);
        }

        // 3. Watchdog
        if let Some(stuck) = self.links.stuck.try_take() {
            self.handle_stuck(stuck, sink);
        }

        // 4. One detection from the live stream
        if let Some(det) = hw.poll_detection() {
            if self.fsm.current_state() == StateId::Scan {
                self.ctx.inputs.detection = Some(det);
            } else {
                ingest_detection(&self.ctx, &det);
            }
        }

        // 5. FSM tick (pure state logic)
        if let Some(rec) = self.fsm.tick(&mut self.ctx) {
            self.record(rec, sink);
        }

        // 6. Carry out the requested effects.  The clock already names the
        //    state they belong to, so a hung call is charged to it.
        self.apply_effects(hw);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn status(&self) -> ControllerStatus {
        let episode = self.ctx.episode.as_ref();
        ControllerStatus {
            state: self.fsm.current_state(),
            halted: self.fsm.current_state() == StateId::Halted,
            pending_targets: self.ctx.queue.len(),
            episode: episode.map(|ep| ep.id),
            active_sector_deg: episode.map(|ep| ep.target.sector_angle),
            attempts_this_episode: episode.map_or(0, |ep| ep.attempts),
            config_version: self.ctx.live.version,
            tick_count: self.tick_count,
        }
    }

    /// Current FSM state.
    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// When the current state was entered (controller clock, ms).
    pub fn state_entered_at_ms(&self) -> u64 {
        self.ctx.state_entered_at_ms
    }

    pub fn links(&self) -> &ControllerLinks {
        &self.links
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    // ── Internal ──────────────────────────────────────────────

    fn refresh_config(&mut self, sink: &mut impl EventSink) {
        let snap = self.links.store.current();
        if snap.version == self.ctx.live.version {
            return;
        }
        info!(
            "Config v{} -> v{} applied (active episode keeps its own)",
            self.ctx.live.version, snap.version
        );
        self.ctx
            .queue
            .set_merge_tolerance(snap.config.detection.merge_tolerance_deg);
        sink.emit(&AppEvent::ConfigApplied {
            version: snap.version,
        });
        self.ctx.live = snap;
    }

    fn handle_stuck(&mut self, stuck: StuckState, sink: &mut impl EventSink) {
        let current = self.fsm.current_state();
        if current != stuck.state || self.ctx.state_entered_at_ms != stuck.entered_at_ms {
            debug!("Watchdog signal for a state already left: {}", stuck);
            return;
        }

        error!("Watchdog abort: {}; discarding active target", stuck);
        self.ctx.effect(Effect::StopTone);
        self.ctx.effect(Effect::StopSpray);
        sink.emit(&AppEvent::WatchdogAbort(stuck));

        // RETURN itself hung: fall through to SCAN.
        let next = if current == StateId::Return {
            StateId::Scan
        } else {
            StateId::Return
        };
        self.force(next, TransitionReason::Watchdog, sink);
    }

    fn force(&mut self, to: StateId, reason: TransitionReason, sink: &mut impl EventSink) {
        if let Some(rec) = self.fsm.force_transition(to, reason, &mut self.ctx) {
            self.record(rec, sink);
        }
    }

    /// Publish and emit events for a transition that just ran.
    fn record(&self, rec: TransitionRecord, sink: &mut impl EventSink) {
        self.publish_clock();
        sink.emit(&AppEvent::StateChanged {
            from: rec.from,
            to: rec.to,
            reason: rec.reason,
        });

        let Some(ep) = self.ctx.episode.as_ref() else {
            return;
        };
        match rec.to {
            StateId::Detect => sink.emit(&AppEvent::EpisodeStarted {
                episode: ep.id,
                sector_deg: ep.target.sector_angle,
            }),
            StateId::Report => {
                if let Some(outcome) = ep.outcome {
                    sink.emit(&AppEvent::EpisodeFinished {
                        episode: ep.id,
                        outcome,
                        attempts: ep.attempts,
                    });
                }
            }
            _ => {}
        }
    }

    fn publish_clock(&self) {
        self.links
            .clock
            .publish(self.fsm.current_state(), self.ctx.state_entered_at_ms);
    }

    /// Translate FSM effects into port calls and feed the results back.
    fn apply_effects<H>(&mut self, hw: &mut H)
    where
        H: MotionPort + SuppressionPort + DetectionPort + TimePort + DelayNs,
    {
        for effect in self.ctx.take_effects() {
            match effect {
                Effect::StartScan => hw.start_continuous_scan(),
                Effect::StopScan => hw.stop_scan(),
                Effect::Aim {
                    sector_deg,
                    elevation_deg,
                } => {
                    let result = hw
                        .rotate_to(sector_deg)
                        .and_then(|()| hw.aim(sector_deg, elevation_deg));
                    self.ctx.inputs.action = Some(outcome(result));
                }
                Effect::Wait { ms } => {
                    if ms > 0 {
                        hw.delay_ms(ms);
                    }
                }
                Effect::PlayTone { duration_ms } => {
                    let result = hw.play_tone(duration_ms);
                    if result.is_err() {
                        hw.stop_tone();
                    }
                    self.ctx.last_actuation_end_ms = Some(hw.now_ms());
                    self.ctx.inputs.action = Some(outcome(result));
                }
                Effect::StopTone => hw.stop_tone(),
                Effect::Spray { duration_ms } => {
                    let result = hw.spray(duration_ms);
                    if result.is_err() {
                        hw.stop_spray();
                    }
                    self.ctx.last_actuation_end_ms = Some(hw.now_ms());
                    self.ctx.inputs.action = Some(outcome(result));
                }
                Effect::StopSpray => hw.stop_spray(),
                Effect::Resample {
                    sector_deg,
                    tolerance_deg,
                    min_confidence,
                } => {
                    let verdict = self.resample(hw, sector_deg, tolerance_deg, min_confidence);
                    self.ctx.inputs.verify = Some(verdict);
                }
                Effect::ReturnToNeutral => {
                    if let Err(e) = hw.return_to_neutral() {
                        warn!("RETURN: {}", e);
                    }
                }
                Effect::Notify(event) => self.notifier.notify(event),
            }
        }
    }

    /// Fire persists iff the fresh frame holds a qualifying detection near
    /// the target.  Other qualifying detections become new targets.
    fn resample(
        &self,
        hw: &mut impl DetectionPort,
        sector_deg: f32,
        tolerance_deg: f32,
        min_confidence: f32,
    ) -> VerifyOutcome {
        let frame = match hw.sample_at(sector_deg) {
            Ok(frame) => frame,
            Err(e) => return VerifyOutcome::SampleFailed(e),
        };

        let mut present = false;
        for det in &frame {
            if !det.meets(min_confidence) {
                continue;
            }
            if angular_distance(det.sector_angle, sector_deg) <= tolerance_deg {
                present = true;
            } else {
                ingest_detection(&self.ctx, det);
            }
        }

        if present {
            VerifyOutcome::FirePersists
        } else {
            VerifyOutcome::FireGone
        }
    }
}

fn outcome(result: Result<(), HardwareError>) -> ActionOutcome {
    match result {
        Ok(()) => ActionOutcome::Completed,
        Err(e) => ActionOutcome::Failed(e),
    }
}
