//! Function-pointer finite state machine engine.
//!
//! Classic embedded FSM pattern ported to Rust:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌─────────────┬───────────┬──────────┬─────────────────────┐ │
//! │  │ StateId     │ on_enter  │ on_exit  │ on_update           │ │
//! │  ├─────────────┼───────────┼──────────┼─────────────────────┤ │
//! │  │ Scan        │ fn(ctx)   │ —        │ fn(ctx)->Option<T>  │ │
//! │  │ Detect      │ fn(ctx)   │ —        │ fn(ctx)->Option<T>  │ │
//! │  │ Sound       │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<T>  │ │
//! │  │ ...         │           │          │                     │ │
//! │  │ Halted      │ fn(ctx)   │ —        │ fn(ctx)->Option<T>  │ │
//! │  └─────────────┴───────────┴──────────┴─────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(transition)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the current
//! pointer.  Handlers are pure with respect to hardware: they read
//! [`FsmContext`] inputs and push [`Effect`](context::Effect)s, which the
//! controller applies afterwards.  A tick is therefore the transition
//! function `(state, input) -> (state, effects)`.

pub mod context;
pub mod states;

use core::fmt;

use context::FsmContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all controller states.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Scan = 0,
    Detect = 1,
    Sound = 2,
    VerifySound = 3,
    Water = 4,
    VerifyWater = 5,
    Report = 6,
    Return = 7,
    /// Emergency stop.  Outside the normal table flow; left only by resume.
    Halted = 8,
}

impl StateId {
    /// Total number of states — used to size the table array.
    pub const COUNT: usize = 9;

    /// Convert a `u8` index back to `StateId`.  Panics on out-of-range in
    /// debug builds; returns `Halted` in release (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Scan,
            1 => Self::Detect,
            2 => Self::Sound,
            3 => Self::VerifySound,
            4 => Self::Water,
            5 => Self::VerifyWater,
            6 => Self::Report,
            7 => Self::Return,
            8 => Self::Halted,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Halted
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Scan => "SCAN",
            Self::Detect => "DETECT",
            Self::Sound => "SOUND",
            Self::VerifySound => "VERIFY_SOUND",
            Self::Water => "WATER",
            Self::VerifyWater => "VERIFY_WATER",
            Self::Report => "REPORT",
            Self::Return => "RETURN",
            Self::Halted => "HALTED",
        }
    }

    /// States the watchdog does not police.
    pub fn is_resting(&self) -> bool {
        matches!(self, Self::Scan | Self::Halted)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Why a transition happened.  Logged with every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    ThresholdCrossed,
    QueuePending,
    AimComplete,
    HardwareFailure,
    ToneComplete,
    SprayComplete,
    FireCleared,
    FirePersists,
    AttemptsExhausted,
    Reported,
    QueueEmpty,
    QueueNonEmpty,
    Watchdog,
    EmergencyStop,
    Resumed,
    NoTarget,
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ThresholdCrossed => "threshold crossed",
            Self::QueuePending => "queued target pending",
            Self::AimComplete => "aim complete",
            Self::HardwareFailure => "hardware failure",
            Self::ToneComplete => "tone complete",
            Self::SprayComplete => "spray complete",
            Self::FireCleared => "verify: fire gone",
            Self::FirePersists => "verify: fire persists",
            Self::AttemptsExhausted => "attempts exhausted",
            Self::Reported => "reported",
            Self::QueueEmpty => "queue empty",
            Self::QueueNonEmpty => "queue non-empty",
            Self::Watchdog => "watchdog",
            Self::EmergencyStop => "emergency stop",
            Self::Resumed => "resumed",
            Self::NoTarget => "no active target",
        };
        f.write_str(s)
    }
}

/// Requested by an `on_update` handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub to: StateId,
    pub reason: TransitionReason,
}

impl Transition {
    pub const fn new(to: StateId, reason: TransitionReason) -> Self {
        Self { to, reason }
    }
}

/// A transition that actually ran.  Returned to the caller for event emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRecord {
    pub from: StateId,
    pub to: StateId,
    pub reason: TransitionReason,
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each state transition.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for the per-tick update handler.
/// Returns `Some(transition)` to leave the state, or `None` to stay.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<Transition>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
/// Stored in a fixed-size array — no heap, no `dyn`.
pub struct StateDescriptor {
    pub id: StateId,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
///
/// Owns the state table (array of [`StateDescriptor`]).  The mutable
/// [`FsmContext`] is threaded through every handler call.
pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    /// Index of the currently active state.
    current: usize,
    /// Monotonically increasing tick counter.
    tick_count: u64,
    /// Tick at which the current state was entered.
    state_entry_tick: u64,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        debug_assert!(
            table.iter().enumerate().all(|(i, d)| d.id as usize == i),
            "state table out of order"
        );
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("FSM starting in state: {}", self.current_state());
        ctx.state_entered_at_ms = ctx.now_ms;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    ///
    /// 1. Call `on_update` for the current state.
    /// 2. If it returns a transition, run `on_exit(current)` → update
    ///    pointer → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut FsmContext) -> Option<TransitionRecord> {
        self.tick_count += 1;

        let next = (self.table[self.current].on_update)(ctx)?;
        Some(self.transition(next, ctx))
    }

    /// Force an immediate transition (watchdog abort, emergency stop,
    /// resume) regardless of what `on_update` would return.
    pub fn force_transition(
        &mut self,
        next: StateId,
        reason: TransitionReason,
        ctx: &mut FsmContext,
    ) -> Option<TransitionRecord> {
        if next as usize == self.current {
            return None;
        }
        Some(self.transition(Transition::new(next, reason), ctx))
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    /// How many ticks the FSM has been in the current state.
    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next: Transition, ctx: &mut FsmContext) -> TransitionRecord {
        let from = self.current_state();

        info!("FSM transition: {} -> {} ({})", from, next.to, next.reason);

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        // Update pointer and timing.  Stale action results never leak into
        // the next state.
        self.current = next.to as usize;
        self.state_entry_tick = self.tick_count;
        ctx.state_entered_at_ms = ctx.now_ms;
        ctx.inputs.action = None;
        ctx.inputs.verify = None;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }

        TransitionRecord {
            from,
            to: next.to,
            reason: next.reason,
        }
    }
}
