//! Target queue — arbitration among simultaneous fire candidates.
//!
//! Detections of the same physical fire are merged (circular angular
//! tolerance) instead of duplicated.  Dequeue order is highest confidence
//! first, ties broken by earliest sighting.
//!
//! The queue is shared between the detection-ingest path and the
//! controller, so every operation runs under one critical-section mutex:
//! an enqueue racing a dequeue can neither lose nor duplicate a target.

use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::fsm::context::Detection;

/// Suppression method last tried on a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SuppressionMethod {
    #[default]
    None,
    Sound,
    Water,
}

impl fmt::Display for SuppressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Sound => "sound",
            Self::Water => "water",
        })
    }
}

/// One physical fire, built from one or more merged detections.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub sector_angle: f32,
    pub elevation_deg: f32,
    pub best_confidence: f32,
    pub first_seen_ms: u64,
    pub method_attempted: SuppressionMethod,
    pub attempt_count: u32,
    pub sound_attempts: u32,
    pub water_attempts: u32,
}

impl Target {
    fn from_detection(det: &Detection) -> Self {
        Self {
            sector_angle: det.sector_angle,
            elevation_deg: det.elevation_deg,
            best_confidence: det.confidence,
            first_seen_ms: det.timestamp_ms,
            method_attempted: SuppressionMethod::None,
            attempt_count: 0,
            sound_attempts: 0,
            water_attempts: 0,
        }
    }

    fn absorb(&mut self, det: &Detection) {
        self.best_confidence = self.best_confidence.max(det.confidence);
    }
}

/// Outcome of [`TargetQueue::try_enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    /// A new pending target was created.
    Added,
    /// Folded into an existing pending or active target.
    Merged,
    /// Refused: the pending list is at capacity.
    Full,
}

/// Smallest angle between two bearings, in `[0, 180]`.
pub fn angular_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

struct State {
    pending: Vec<Target>,
    /// Target currently owned by the controller.  Kept so re-sightings of
    /// the fire being fought merge instead of queueing a duplicate.
    active: Option<Target>,
    tolerance_deg: f32,
}

impl State {
    /// Nearest pending or active target within tolerance.
    fn nearest_mut(&mut self, angle: f32) -> Option<&mut Target> {
        let tol = self.tolerance_deg;
        self.pending
            .iter_mut()
            .chain(self.active.iter_mut())
            .filter(|t| angular_distance(t.sector_angle, angle) <= tol)
            .min_by(|a, b| {
                angular_distance(a.sector_angle, angle)
                    .total_cmp(&angular_distance(b.sector_angle, angle))
            })
    }
}

pub struct TargetQueue {
    inner: Mutex<CriticalSectionRawMutex, RefCell<State>>,
}

impl TargetQueue {
    pub fn new(merge_tolerance_deg: f32) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(State {
                pending: Vec::new(),
                active: None,
                tolerance_deg: merge_tolerance_deg,
            })),
        }
    }

    /// Add a detection, or merge it into a nearby target.
    ///
    /// Returns `false` when the detection was merged.  No size bound.
    pub fn enqueue(&self, det: &Detection) -> bool {
        self.try_enqueue(det, usize::MAX) == Enqueue::Added
    }

    /// Like [`enqueue`](Self::enqueue) but refuses new targets once
    /// `max_pending` are waiting.  Merges are always accepted.
    pub fn try_enqueue(&self, det: &Detection, max_pending: usize) -> Enqueue {
        self.inner.lock(|cell| {
            let mut state = cell.borrow_mut();
            if let Some(existing) = state.nearest_mut(det.sector_angle) {
                existing.absorb(det);
                return Enqueue::Merged;
            }
            if state.pending.len() >= max_pending {
                return Enqueue::Full;
            }
            state.pending.push(Target::from_detection(det));
            Enqueue::Added
        })
    }

    /// Remove and return the best pending target, marking it active.
    pub fn dequeue_highest_priority(&self) -> Option<Target> {
        self.inner.lock(|cell| {
            let mut state = cell.borrow_mut();
            let idx = state
                .pending
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    b.best_confidence
                        .total_cmp(&a.best_confidence)
                        .then(a.first_seen_ms.cmp(&b.first_seen_ms))
                })
                .map(|(i, _)| i)?;
            let target = state.pending.remove(idx);
            state.active = Some(target.clone());
            Some(target)
        })
    }

    /// The controller finished with its active target.
    pub fn release_active(&self) {
        self.inner.lock(|cell| cell.borrow_mut().active = None);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock(|cell| cell.borrow().pending.is_empty())
    }

    /// Number of pending (not active) targets.
    pub fn len(&self) -> usize {
        self.inner.lock(|cell| cell.borrow().pending.len())
    }

    pub fn set_merge_tolerance(&self, tolerance_deg: f32) {
        self.inner
            .lock(|cell| cell.borrow_mut().tolerance_deg = tolerance_deg);
    }

    /// Copy of the pending targets in insertion order.
    pub fn pending(&self) -> Vec<Target> {
        self.inner.lock(|cell| cell.borrow().pending.clone())
    }
}
