//! Concrete state handler functions and table builder.
//!
//! Each state is defined by three plain `fn` pointers — no closures, no
//! dynamic dispatch, no heap.  Handlers only touch the [`FsmContext`]
//! blackboard; hardware work is requested as [`Effect`]s.
//!
//! ```text
//!  SCAN ──[conf ≥ threshold ∧ ≥ floor]──▶ DETECT ──[aim]──▶ SOUND ──▶ VERIFY_SOUND
//!    ▲                                       ▲                ▲            │
//!    │                                       │                └─[persists, sound left]
//!    │                                       │                             │
//!    │                                       │      WATER ◀──[persists]────┤
//!    │                                       │        │  ▲                 │
//!    │                                       │        ▼  │[persists]       │[gone]
//!    │                                       │   VERIFY_WATER ──[gone]──┐  │
//!    │                                       │        │[exhausted]      ▼  ▼
//!    └──[queue empty]── RETURN ──[queue]─────┘        └──────────────▶ REPORT
//!                         ▲                                             │
//!                         └─────────────────────────────────────────────┘
//!
//!  Any state ──[e-stop]──▶ HALTED ──[resume]──▶ SCAN
//!  Any policed state ──[watchdog]──▶ RETURN
//! ```

use log::{debug, info, warn};

use super::context::{
    ActionOutcome, Detection, Effect, Episode, EpisodeOutcome, FsmContext, VerifyOutcome,
};
use super::{StateDescriptor, StateId, Transition, TransitionReason};
use crate::notify::NotificationEvent;
use crate::queue::{Enqueue, SuppressionMethod};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0 — Scan
        StateDescriptor {
            id: StateId::Scan,
            on_enter: Some(scan_enter),
            on_exit: None,
            on_update: scan_update,
        },
        // Index 1 — Detect
        StateDescriptor {
            id: StateId::Detect,
            on_enter: Some(detect_enter),
            on_exit: None,
            on_update: detect_update,
        },
        // Index 2 — Sound
        StateDescriptor {
            id: StateId::Sound,
            on_enter: Some(sound_enter),
            on_exit: Some(sound_exit),
            on_update: sound_update,
        },
        // Index 3 — VerifySound
        StateDescriptor {
            id: StateId::VerifySound,
            on_enter: Some(verify_enter),
            on_exit: None,
            on_update: verify_sound_update,
        },
        // Index 4 — Water
        StateDescriptor {
            id: StateId::Water,
            on_enter: Some(water_enter),
            on_exit: Some(water_exit),
            on_update: water_update,
        },
        // Index 5 — VerifyWater
        StateDescriptor {
            id: StateId::VerifyWater,
            on_enter: Some(verify_enter),
            on_exit: None,
            on_update: verify_water_update,
        },
        // Index 6 — Report
        StateDescriptor {
            id: StateId::Report,
            on_enter: Some(report_enter),
            on_exit: None,
            on_update: report_update,
        },
        // Index 7 — Return
        StateDescriptor {
            id: StateId::Return,
            on_enter: Some(return_enter),
            on_exit: None,
            on_update: return_update,
        },
        // Index 8 — Halted
        StateDescriptor {
            id: StateId::Halted,
            on_enter: Some(halted_enter),
            on_exit: None,
            on_update: halted_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared helpers
// ═══════════════════════════════════════════════════════════════════════════

/// Filter a detection against the live trigger threshold, the absolute
/// floor, and the queue cap, then enqueue it.
///
/// Returns `true` only when a new target was created.
pub fn ingest_detection(ctx: &FsmContext, det: &Detection) -> bool {
    let cfg = &ctx.live.config;

    if !det.sector_angle.is_finite() || !det.meets(cfg.safety.min_confidence) {
        debug!(
            "ingest: {:.1}° conf {:.3} below floor {:.3}",
            det.sector_angle, det.confidence, cfg.safety.min_confidence
        );
        return false;
    }
    if !det.meets(cfg.detection.confidence_threshold) {
        debug!(
            "ingest: {:.1}° conf {:.3} below threshold {:.3}",
            det.sector_angle, det.confidence, cfg.detection.confidence_threshold
        );
        return false;
    }

    match ctx
        .queue
        .try_enqueue(det, usize::from(cfg.state_machine.max_queue_size))
    {
        Enqueue::Added => {
            info!(
                "ingest: target queued at {:.1}° (conf {:.3})",
                det.sector_angle, det.confidence
            );
            true
        }
        Enqueue::Merged => {
            debug!("ingest: {:.1}° merged into existing target", det.sector_angle);
            false
        }
        Enqueue::Full => {
            warn!(
                "ingest: queue full ({}), dropping target at {:.1}°",
                cfg.state_machine.max_queue_size, det.sector_angle
            );
            false
        }
    }
}

/// Pick the next method for an episode whose fire is still burning.
/// Sound is preferred while its cap allows, then water.
fn next_suppression(ep: &mut Episode, reason: TransitionReason) -> Transition {
    if ep.sound_available() {
        Transition::new(StateId::Sound, reason)
    } else if ep.water_available() {
        Transition::new(StateId::Water, reason)
    } else {
        exhausted(ep)
    }
}

fn exhausted(ep: &mut Episode) -> Transition {
    warn!(
        "episode #{}: attempts exhausted ({} of {})",
        ep.id, ep.attempts, ep.config.config.safety.max_total_attempts
    );
    ep.outcome = Some(EpisodeOutcome::Failed);
    Transition::new(StateId::Report, TransitionReason::AttemptsExhausted)
}

fn lost_target(state: StateId) -> Option<Transition> {
    warn!("{}: no active target, returning", state);
    Some(Transition::new(StateId::Return, TransitionReason::NoTarget))
}

/// Spend an attempt on `method` and request the gated actuation.
fn begin_actuation(ctx: &mut FsmContext, method: SuppressionMethod) {
    let interlock = ctx.interlock_remaining_ms();
    let (effect, label) = match method {
        SuppressionMethod::Water => (
            Effect::Spray {
                duration_ms: ctx.live.config.water.spray_duration_ms,
            },
            "WATER",
        ),
        _ => (
            Effect::PlayTone {
                duration_ms: ctx.live.config.audio.duration_ms,
            },
            "SOUND",
        ),
    };

    let Some(ep) = ctx.episode.as_mut() else {
        return;
    };
    ep.spend_attempt(Some(method));
    info!(
        "{}: episode #{} attempt {}/{} at {:.1}°",
        label,
        ep.id,
        ep.attempts,
        ep.config.config.safety.max_total_attempts,
        ep.target.sector_angle
    );

    if interlock > 0 {
        debug!("{}: interlock hold {} ms", label, interlock);
        ctx.effect(Effect::Wait { ms: interlock });
    }
    ctx.effect(effect);
}

// ═══════════════════════════════════════════════════════════════════════════
//  SCAN state — continuous rotation, waiting for a qualifying detection
// ═══════════════════════════════════════════════════════════════════════════

fn scan_enter(ctx: &mut FsmContext) {
    ctx.effect(Effect::StartScan);
    info!("SCAN: continuous rotation resumed");
}

fn scan_update(ctx: &mut FsmContext) -> Option<Transition> {
    let mut created = false;
    if let Some(det) = ctx.inputs.detection.take() {
        created = ingest_detection(ctx, &det);
    }

    // Also drains targets left by the verification ingest path.
    let target = ctx.queue.dequeue_highest_priority()?;
    ctx.begin_episode(target);

    let reason = if created {
        TransitionReason::ThresholdCrossed
    } else {
        TransitionReason::QueuePending
    };
    Some(Transition::new(StateId::Detect, reason))
}

// ═══════════════════════════════════════════════════════════════════════════
//  DETECT state — stop rotating, announce, aim
// ═══════════════════════════════════════════════════════════════════════════

fn detect_enter(ctx: &mut FsmContext) {
    let Some(ep) = ctx.episode.as_ref() else {
        return;
    };
    let (id, sector, elevation) = (ep.id, ep.target.sector_angle, ep.target.elevation_deg);
    info!(
        "DETECT: episode #{} target {:.1}° / {:.1}° (conf {:.3})",
        id, sector, elevation, ep.target.best_confidence
    );

    ctx.effect(Effect::StopScan);
    ctx.effect(Effect::Notify(NotificationEvent::Detected {
        episode: id,
        sector_deg: sector,
    }));
    ctx.effect(Effect::Aim {
        sector_deg: sector,
        elevation_deg: elevation,
    });
}

fn detect_update(ctx: &mut FsmContext) -> Option<Transition> {
    let outcome = ctx.inputs.action.take()?;
    let Some(ep) = ctx.episode.as_mut() else {
        return lost_target(StateId::Detect);
    };

    let reason = match outcome {
        ActionOutcome::Completed => TransitionReason::AimComplete,
        ActionOutcome::Failed(e) => {
            warn!("DETECT: {}, spending an attempt", e);
            ep.spend_attempt(None);
            TransitionReason::HardwareFailure
        }
    };
    Some(next_suppression(ep, reason))
}

// ═══════════════════════════════════════════════════════════════════════════
//  SOUND state — low-frequency tone
// ═══════════════════════════════════════════════════════════════════════════

fn sound_enter(ctx: &mut FsmContext) {
    begin_actuation(ctx, SuppressionMethod::Sound);
}

fn sound_exit(ctx: &mut FsmContext) {
    ctx.effect(Effect::StopTone);
}

fn sound_update(ctx: &mut FsmContext) -> Option<Transition> {
    match ctx.inputs.action.take()? {
        ActionOutcome::Completed => Some(Transition::new(
            StateId::VerifySound,
            TransitionReason::ToneComplete,
        )),
        ActionOutcome::Failed(e) => {
            warn!("SOUND: {}, treating as fire persisting", e);
            let Some(ep) = ctx.episode.as_mut() else {
                return lost_target(StateId::Sound);
            };
            Some(next_suppression(ep, TransitionReason::HardwareFailure))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  WATER state — pump spray
// ═══════════════════════════════════════════════════════════════════════════

fn water_enter(ctx: &mut FsmContext) {
    begin_actuation(ctx, SuppressionMethod::Water);
}

fn water_exit(ctx: &mut FsmContext) {
    ctx.effect(Effect::StopSpray);
}

fn water_update(ctx: &mut FsmContext) -> Option<Transition> {
    match ctx.inputs.action.take()? {
        ActionOutcome::Completed => Some(Transition::new(
            StateId::VerifyWater,
            TransitionReason::SprayComplete,
        )),
        ActionOutcome::Failed(e) => {
            warn!("WATER: {}, treating as fire persisting", e);
            let Some(ep) = ctx.episode.as_mut() else {
                return lost_target(StateId::Water);
            };
            Some(water_retry(ep, TransitionReason::HardwareFailure))
        }
    }
}

/// After water, only water is retried.
fn water_retry(ep: &mut Episode, reason: TransitionReason) -> Transition {
    if ep.water_available() {
        Transition::new(StateId::Water, reason)
    } else {
        exhausted(ep)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  VERIFY_SOUND / VERIFY_WATER — settle, re-sample, decide
// ═══════════════════════════════════════════════════════════════════════════

fn verify_enter(ctx: &mut FsmContext) {
    let settle = ctx.live.config.state_machine.verify_delay_ms;
    let Some(ep) = ctx.episode.as_ref() else {
        return;
    };
    let resample = Effect::Resample {
        sector_deg: ep.target.sector_angle,
        tolerance_deg: ep.config.config.detection.merge_tolerance_deg,
        min_confidence: ep.config.config.safety.min_confidence,
    };
    ctx.effect(Effect::Wait { ms: settle });
    ctx.effect(resample);
}

/// Log the verdict and say whether the fire is still there.
fn fire_present(state: StateId, ep: &Episode, verdict: VerifyOutcome) -> bool {
    match verdict {
        VerifyOutcome::FireGone => info!("{}: episode #{} fire gone", state, ep.id),
        VerifyOutcome::FirePersists => info!("{}: episode #{} fire persists", state, ep.id),
        VerifyOutcome::SampleFailed(e) => {
            warn!("{}: {}, treating as fire persisting", state, e);
        }
    }
    verdict.fire_present()
}

fn verify_sound_update(ctx: &mut FsmContext) -> Option<Transition> {
    let verdict = ctx.inputs.verify.take()?;
    let Some(ep) = ctx.episode.as_mut() else {
        return lost_target(StateId::VerifySound);
    };

    if !fire_present(StateId::VerifySound, ep, verdict) {
        ep.outcome = Some(EpisodeOutcome::Suppressed(SuppressionMethod::Sound));
        return Some(Transition::new(StateId::Report, TransitionReason::FireCleared));
    }
    Some(next_suppression(ep, TransitionReason::FirePersists))
}

fn verify_water_update(ctx: &mut FsmContext) -> Option<Transition> {
    let verdict = ctx.inputs.verify.take()?;
    let Some(ep) = ctx.episode.as_mut() else {
        return lost_target(StateId::VerifyWater);
    };

    if !fire_present(StateId::VerifyWater, ep, verdict) {
        ep.outcome = Some(EpisodeOutcome::Suppressed(SuppressionMethod::Water));
        return Some(Transition::new(StateId::Report, TransitionReason::FireCleared));
    }
    Some(water_retry(ep, TransitionReason::FirePersists))
}

// ═══════════════════════════════════════════════════════════════════════════
//  REPORT state — exactly one terminal notification
// ═══════════════════════════════════════════════════════════════════════════

fn report_enter(ctx: &mut FsmContext) {
    let Some(ep) = ctx.episode.as_ref() else {
        return;
    };
    let event = match ep.outcome {
        Some(EpisodeOutcome::Suppressed(method)) => NotificationEvent::Suppressed {
            episode: ep.id,
            sector_deg: ep.target.sector_angle,
            method,
        },
        Some(EpisodeOutcome::Failed) | None => NotificationEvent::Failed {
            episode: ep.id,
            sector_deg: ep.target.sector_angle,
            attempts: ep.attempts,
        },
    };
    info!("REPORT: episode #{} -> {}", ep.id, event.message());
    ctx.effect(Effect::Notify(event));
}

fn report_update(_ctx: &mut FsmContext) -> Option<Transition> {
    Some(Transition::new(StateId::Return, TransitionReason::Reported))
}

// ═══════════════════════════════════════════════════════════════════════════
//  RETURN state — park the arm, release the target
// ═══════════════════════════════════════════════════════════════════════════

fn return_enter(ctx: &mut FsmContext) {
    let settle = ctx.live.config.state_machine.return_delay_ms;
    ctx.effect(Effect::Wait { ms: settle });
    ctx.effect(Effect::ReturnToNeutral);

    if let Some(ep) = ctx.end_episode() {
        info!(
            "RETURN: episode #{} closed after {} attempt(s)",
            ep.id, ep.attempts
        );
    }
}

fn return_update(ctx: &mut FsmContext) -> Option<Transition> {
    match ctx.queue.dequeue_highest_priority() {
        Some(target) => {
            ctx.begin_episode(target);
            Some(Transition::new(
                StateId::Detect,
                TransitionReason::QueueNonEmpty,
            ))
        }
        None => Some(Transition::new(StateId::Scan, TransitionReason::QueueEmpty)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  HALTED state — emergency stop, all actuation off
// ═══════════════════════════════════════════════════════════════════════════

fn halted_enter(ctx: &mut FsmContext) {
    ctx.effect(Effect::StopScan);
    ctx.effect(Effect::StopTone);
    ctx.effect(Effect::StopSpray);
    if let Some(ep) = ctx.end_episode() {
        warn!("HALTED: episode #{} abandoned at {:.1}°", ep.id, ep.target.sector_angle);
    }
    warn!("HALTED: all actuation stopped, waiting for resume");
}

fn halted_update(_ctx: &mut FsmContext) -> Option<Transition> {
    // Left only through an explicit resume.
    None
}
