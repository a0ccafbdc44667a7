//! End-to-end episodes through the SuppressionController.
//!
//! Every test drives the real FSM, queue, config store and effect
//! application against [`MockHardware`]; only time and the scene are fake.

use aipawe::app::events::AppEvent;
use aipawe::config::SystemConfig;
use aipawe::fsm::context::EpisodeOutcome;
use aipawe::fsm::{StateId, TransitionReason};
use aipawe::queue::SuppressionMethod;

use crate::mock_hw::{HangingSpray, HwCall, Rig};

const FOREVER: u32 = u32::MAX;

fn finished(rig: &Rig) -> Vec<(EpisodeOutcome, u32)> {
    rig.sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::EpisodeFinished {
                outcome, attempts, ..
            } => Some((*outcome, *attempts)),
            _ => None,
        })
        .collect()
}

fn started_sectors(rig: &Rig) -> Vec<f32> {
    rig.sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::EpisodeStarted { sector_deg, .. } => Some(*sector_deg),
            _ => None,
        })
        .collect()
}

// ── Happy paths ───────────────────────────────────────────────

#[test]
fn sound_suppresses_fire_on_first_try() {
    let mut rig = Rig::with_defaults();
    rig.hw.ignite(127.0, 0.785, 1);
    rig.run_to_idle(20);

    assert_eq!(
        rig.notes().messages(),
        vec![
            "Fire detected at sector 127.0° - AIPAWE responding".to_string(),
            "Fire suppressed successfully using sound at sector 127.0°".to_string(),
        ]
    );
    assert_eq!(
        rig.sink.states(),
        vec![
            StateId::Detect,
            StateId::Sound,
            StateId::VerifySound,
            StateId::Report,
            StateId::Return,
            StateId::Scan,
        ]
    );
    assert_eq!(rig.hw.count(|c| matches!(c, HwCall::Tone(5_000))), 1);
    assert_eq!(rig.hw.count(|c| matches!(c, HwCall::Spray(_))), 0);
    assert_eq!(
        finished(&rig),
        vec![(EpisodeOutcome::Suppressed(SuppressionMethod::Sound), 1)]
    );
}

#[test]
fn detect_stops_scan_and_aims_at_target() {
    let mut rig = Rig::with_defaults();
    rig.hw.ignite(127.0, 0.785, 1);
    rig.tick();

    assert_eq!(rig.ctl.state(), StateId::Detect);
    let tail: Vec<_> = rig.hw.calls.iter().rev().take(3).rev().cloned().collect();
    assert_eq!(
        tail,
        vec![
            HwCall::StopScan,
            HwCall::RotateTo(127.0),
            HwCall::Aim(127.0, 0.0)
        ]
    );
    let status = rig.ctl.status();
    assert_eq!(status.episode, Some(1));
    assert_eq!(status.active_sector_deg, Some(127.0));
}

#[test]
fn escalates_from_sound_to_water() {
    let mut rig = Rig::with_defaults();
    rig.hw.ignite(127.0, 0.785, 3);
    rig.run_to_idle(40);

    assert_eq!(rig.hw.count(|c| matches!(c, HwCall::Tone(_))), 2);
    assert_eq!(rig.hw.count(|c| matches!(c, HwCall::Spray(3_000))), 1);
    assert_eq!(
        rig.notes().messages()[1],
        "Fire suppressed successfully using water at sector 127.0°"
    );
    assert_eq!(
        finished(&rig),
        vec![(EpisodeOutcome::Suppressed(SuppressionMethod::Water), 3)]
    );
}

// ── Failure paths ─────────────────────────────────────────────

#[test]
fn gives_up_after_five_attempts() {
    let mut rig = Rig::with_defaults();
    rig.hw.ignite(127.0, 0.785, FOREVER);
    rig.run_to_idle(60);

    assert_eq!(
        rig.notes().messages(),
        vec![
            "Fire detected at sector 127.0° - AIPAWE responding".to_string(),
            "Suppression failed after 5 attempts at sector 127.0° - manual intervention required"
                .to_string(),
        ]
    );
    assert_eq!(rig.hw.count(|c| matches!(c, HwCall::Tone(_))), 2);
    assert_eq!(rig.hw.count(|c| matches!(c, HwCall::Spray(_))), 3);
    assert_eq!(finished(&rig), vec![(EpisodeOutcome::Failed, 5)]);
    assert!(rig.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::StateChanged {
            to: StateId::Report,
            reason: TransitionReason::AttemptsExhausted,
            ..
        }
    )));
}

#[test]
fn aim_failure_spends_an_attempt() {
    let mut rig = Rig::with_defaults();
    rig.hw.fail_aim = true;
    rig.hw.ignite(127.0, 0.785, 1);
    rig.run_to_idle(60);

    // Never aimed, so nothing lands: aim + 2 sound + 2 water.
    assert_eq!(rig.hw.count(|c| matches!(c, HwCall::Tone(_))), 2);
    assert_eq!(rig.hw.count(|c| matches!(c, HwCall::Spray(_))), 2);
    assert_eq!(finished(&rig), vec![(EpisodeOutcome::Failed, 5)]);
}

#[test]
fn camera_failure_counts_as_fire_persisting() {
    let mut rig = Rig::with_defaults();
    rig.hw.fail_camera = true;
    rig.hw.ignite(127.0, 0.785, 1);
    rig.run_to_idle(60);

    assert_eq!(finished(&rig), vec![(EpisodeOutcome::Failed, 5)]);
    assert_eq!(rig.notes().terminal_count(), 1);
}

#[test]
fn tone_failure_moves_on_without_verify() {
    let mut rig = Rig::with_defaults();
    rig.hw.fail_tone = true;
    rig.hw.ignite(127.0, 0.785, 1);
    rig.run_to_idle(60);

    // Both tones fail, first spray lands.
    let states = rig.sink.states();
    assert!(!states.contains(&StateId::VerifySound));
    assert_eq!(
        finished(&rig),
        vec![(EpisodeOutcome::Suppressed(SuppressionMethod::Water), 3)]
    );
    // A failed tone is always explicitly stopped.
    assert!(rig.hw.count(|c| *c == HwCall::StopTone) >= 2);
}

// ── Interlock ─────────────────────────────────────────────────

#[test]
fn interlock_holds_back_quick_retry() {
    let mut cfg = SystemConfig::default();
    cfg.state_machine.verify_delay_ms = 100;
    cfg.safety.interlock_delay_ms = 500;
    let mut rig = Rig::new(cfg);
    rig.hw.ignite(127.0, 0.785, 2);
    rig.run_to_idle(40);

    // Tone ends at T.  Next tick (T+10) enters VERIFY and settles 100 ms;
    // the tick after (T+120) re-enters SOUND with 380 ms of gap left.
    let tones: Vec<usize> = rig
        .hw
        .calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, HwCall::Tone(_)))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(tones.len(), 2);
    assert_eq!(rig.hw.calls[tones[1] - 1], HwCall::Delay(380));
}

#[test]
fn long_verify_delay_needs_no_interlock_wait() {
    let mut rig = Rig::with_defaults();
    rig.hw.ignite(127.0, 0.785, 2);
    rig.run_to_idle(40);

    let delays: Vec<u32> = rig
        .hw
        .calls
        .iter()
        .filter_map(|c| match c {
            HwCall::Delay(ms) => Some(*ms),
            _ => None,
        })
        .collect();
    // Two verify settles, one return settle.
    assert_eq!(delays, vec![2_000, 2_000, 1_000]);
}

// ── Hot reload ────────────────────────────────────────────────

#[test]
fn reload_mid_water_does_not_abort_episode() {
    let mut rig = Rig::with_defaults();
    rig.hw.ignite(127.0, 0.785, 4);
    rig.run_until(StateId::Water, 30);

    let mut tighter = SystemConfig::default();
    tighter.safety.max_total_attempts = 1;
    let snap = rig.store.publish(tighter).unwrap();
    assert_eq!(snap.version, 2);

    rig.run_to_idle(40);
    assert_eq!(
        finished(&rig),
        vec![(EpisodeOutcome::Suppressed(SuppressionMethod::Water), 4)]
    );
    assert!(
        rig.sink
            .events
            .contains(&AppEvent::ConfigApplied { version: 2 })
    );

    // The next episode runs under the tighter limit.
    rig.hw.ignite(200.0, 0.9, FOREVER);
    rig.run_to_idle(40);
    assert_eq!(
        rig.notes().messages().last().unwrap(),
        "Suppression failed after 1 attempts at sector 200.0° - manual intervention required"
    );
}

#[test]
fn reload_changes_live_durations_for_next_attempt() {
    let mut rig = Rig::with_defaults();
    rig.hw.ignite(127.0, 0.785, 2);
    rig.run_until(StateId::VerifySound, 10);

    let mut longer = SystemConfig::default();
    longer.audio.duration_ms = 7_000;
    rig.store.publish(longer).unwrap();
    rig.run_to_idle(20);

    assert_eq!(rig.hw.count(|c| *c == HwCall::Tone(5_000)), 1);
    assert_eq!(rig.hw.count(|c| *c == HwCall::Tone(7_000)), 1);
}

#[test]
fn status_reports_config_version() {
    let mut rig = Rig::with_defaults();
    assert_eq!(rig.ctl.status().config_version, 1);
    let mut cfg = SystemConfig::default();
    cfg.detection.confidence_threshold = 0.7;
    rig.store.publish(cfg).unwrap();
    rig.tick();
    assert_eq!(rig.ctl.status().config_version, 2);
}

// ── Watchdog ──────────────────────────────────────────────────

#[test]
fn watchdog_aborts_spray_that_hangs() {
    let mut rig = Rig::with_defaults();
    let links = rig.ctl.links().clone();
    let timeout = rig.store.current().config.state_machine.watchdog_timeout_ms;
    rig.hw.hang_spray = Some(HangingSpray::new(&links, timeout));
    rig.hw.ignite(127.0, 0.785, FOREVER);
    rig.run_until(StateId::Water, 30);

    // The stuck call was charged to WATER, not the state before it.
    let hang = rig.hw.hang_spray.as_ref().unwrap();
    assert_eq!(
        hang.seen,
        Some((StateId::Water, rig.ctl.state_entered_at_ms()))
    );
    assert!(hang.raised);

    rig.tick();

    assert!(
        rig.sink
            .events
            .iter()
            .any(|e| matches!(e, AppEvent::WatchdogAbort(s) if s.state == StateId::Water))
    );
    assert!(rig.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::StateChanged {
            from: StateId::Water,
            to: StateId::Return,
            reason: TransitionReason::Watchdog,
        }
    )));
    assert!(!rig.sink.states().contains(&StateId::VerifyWater));
    assert_eq!(rig.ctl.state(), StateId::Scan);
    assert!(rig.hw.calls.contains(&HwCall::StopSpray));
    assert!(rig.hw.calls.contains(&HwCall::Neutral));

    // Target gone, no terminal SMS, nothing more sprayed.
    for _ in 0..10 {
        rig.tick();
    }
    let status = rig.ctl.status();
    assert_eq!(status.episode, None);
    assert_eq!(status.pending_targets, 0);
    assert_eq!(rig.notes().terminal_count(), 0);
    assert!(finished(&rig).is_empty());
    assert_eq!(rig.hw.count(|c| matches!(c, HwCall::Spray(_))), 1);
}

#[test]
fn state_clock_follows_each_transition() {
    let mut rig = Rig::with_defaults();
    rig.hw.ignite(127.0, 0.785, 1);
    rig.tick();
    assert_eq!(rig.ctl.state(), StateId::Detect);
    let (state, entered) = rig.ctl.links().clock.read();
    assert_eq!(state, StateId::Detect);
    assert_eq!(entered, rig.ctl.state_entered_at_ms());
}

#[test]
fn stale_watchdog_signal_is_ignored() {
    let mut rig = Rig::with_defaults();
    rig.hw.ignite(127.0, 0.785, FOREVER);
    rig.run_until(StateId::Sound, 10);

    let links = rig.ctl.links().clone();
    let (_, entered) = links.clock.read();
    // Raised for a state the controller has since left.
    links.stuck.signal(aipawe::error::StuckState {
        state: StateId::Detect,
        entered_at_ms: entered,
        held_ms: 1,
    });
    rig.tick();

    assert_eq!(rig.ctl.state(), StateId::VerifySound);
    assert!(
        !rig.sink
            .events
            .iter()
            .any(|e| matches!(e, AppEvent::WatchdogAbort(_)))
    );
}

// ── Detection filtering and arbitration ───────────────────────

#[test]
fn sub_floor_detections_never_enqueue() {
    let mut rig = Rig::with_defaults();
    rig.hw.detect(90.0, 0.2);
    rig.hw.detect(100.0, 0.5);
    for _ in 0..5 {
        rig.tick();
    }
    assert_eq!(rig.ctl.state(), StateId::Scan);
    assert_eq!(rig.ctl.status().pending_targets, 0);
    assert!(rig.notes().events.is_empty());

    // Also ignored while an episode is running.
    rig.hw.ignite(127.0, 0.785, FOREVER);
    rig.tick();
    rig.hw.detect(300.0, 0.1);
    rig.tick();
    assert_eq!(rig.ctl.status().pending_targets, 0);
}

#[test]
fn nan_confidence_never_enqueues() {
    let mut rig = Rig::with_defaults();
    rig.hw.detect(90.0, f32::NAN);
    rig.tick();
    assert_eq!(rig.ctl.state(), StateId::Scan);
    assert_eq!(rig.ctl.status().pending_targets, 0);

    // Nor while an episode is running, where it would outrank everything.
    rig.hw.ignite(127.0, 0.785, FOREVER);
    rig.tick();
    rig.hw.detect(300.0, f32::NAN);
    rig.tick();
    assert_eq!(rig.ctl.status().pending_targets, 0);
    assert_eq!(started_sectors(&rig), vec![127.0]);
}

#[test]
fn nan_confidence_in_verify_frame_is_not_fire() {
    let mut rig = Rig::with_defaults();
    rig.hw.ignite(127.0, 0.785, FOREVER);
    rig.run_until(StateId::Sound, 10);
    rig.hw.fires[0].confidence = f32::NAN;
    rig.run_to_idle(20);

    assert_eq!(finished(&rig), vec![(EpisodeOutcome::Suppressed(SuppressionMethod::Sound), 1)]);
}

#[test]
fn repeated_sightings_merge_into_one_target() {
    let mut rig = Rig::with_defaults();
    rig.hw.ignite(127.0, 0.785, 1);
    rig.tick();
    assert_eq!(rig.ctl.state(), StateId::Detect);

    rig.hw.ignite(200.0, 0.9, 1);
    rig.hw.detect(203.0, 0.8);
    rig.hw.detect(200.0, 0.9);
    // Re-sightings of the fire being fought merge into the active target.
    rig.hw.detect(125.0, 0.95);
    for _ in 0..4 {
        rig.tick();
    }
    assert_eq!(rig.ctl.status().pending_targets, 1);

    rig.run_to_idle(30);
    assert_eq!(started_sectors(&rig), vec![127.0, 200.0]);
    assert_eq!(rig.notes().terminal_count(), 2);
}

#[test]
fn pending_targets_served_by_confidence() {
    let mut rig = Rig::with_defaults();
    rig.hw.ignite(127.0, 0.785, 1);
    rig.tick();

    rig.hw.ignite(10.0, 0.7, 1);
    rig.hw.ignite(300.0, 0.95, 1);
    rig.run_to_idle(60);

    assert_eq!(started_sectors(&rig), vec![127.0, 300.0, 10.0]);
    assert!(rig.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::StateChanged {
            from: StateId::Return,
            to: StateId::Detect,
            reason: TransitionReason::QueueNonEmpty,
        }
    )));
}

#[test]
fn queue_cap_refuses_extra_targets() {
    let mut cfg = SystemConfig::default();
    cfg.state_machine.max_queue_size = 2;
    let mut rig = Rig::new(cfg);
    rig.hw.ignite(127.0, 0.785, FOREVER);
    rig.tick();

    for angle in [10.0, 60.0, 250.0] {
        rig.hw.detect(angle, 0.9);
    }
    for _ in 0..3 {
        rig.tick();
    }
    assert_eq!(rig.ctl.status().pending_targets, 2);
}

#[test]
fn verify_frame_discovers_neighbouring_fire() {
    let mut rig = Rig::with_defaults();
    rig.hw.ignite(127.0, 0.785, 1);
    // In view of the verify frame but never reported on the stream.
    rig.hw.fires.push(crate::mock_hw::MockFire {
        sector_deg: 150.0,
        confidence: 0.8,
        hits: 1,
    });
    rig.run_to_idle(40);

    assert_eq!(started_sectors(&rig), vec![127.0, 150.0]);
}

// ── Emergency stop ────────────────────────────────────────────

#[test]
fn estop_halts_and_resume_returns_to_scan() {
    let mut rig = Rig::with_defaults();
    rig.hw.ignite(127.0, 0.785, FOREVER);
    rig.run_until(StateId::Sound, 10);

    rig.ctl.links().estop.engage();
    rig.tick();

    assert_eq!(rig.ctl.state(), StateId::Halted);
    assert!(rig.ctl.status().halted);
    assert_eq!(rig.ctl.status().episode, None);
    assert!(rig.sink.events.contains(&AppEvent::EmergencyStop));
    let tail: Vec<_> = rig.hw.calls.iter().rev().take(3).rev().cloned().collect();
    assert_eq!(
        tail,
        vec![HwCall::StopScan, HwCall::StopTone, HwCall::StopSpray]
    );

    // Held while engaged: no actuation.
    let calls = rig.hw.calls.len();
    for _ in 0..5 {
        rig.tick();
    }
    assert_eq!(rig.hw.calls.len(), calls);
    assert_eq!(rig.ctl.state(), StateId::Halted);

    rig.ctl.links().estop.release();
    rig.tick();
    assert_eq!(rig.ctl.state(), StateId::Scan);
    assert!(rig.sink.events.contains(&AppEvent::Resumed));
    assert_eq!(rig.hw.calls.last(), Some(&HwCall::StartScan));
    assert_eq!(rig.notes().terminal_count(), 0);
}

#[test]
fn estop_in_scan_still_halts() {
    let mut rig = Rig::with_defaults();
    rig.ctl.links().estop.engage();
    rig.tick();
    assert_eq!(rig.ctl.state(), StateId::Halted);

    // Detections while halted wait in the feed.
    rig.hw.ignite(127.0, 0.785, 1);
    rig.tick();
    assert_eq!(rig.hw.detections.len(), 1);

    rig.ctl.links().estop.release();
    rig.run_to_idle(20);
    assert_eq!(rig.notes().terminal_count(), 1);
}
