//! Notification gateway — controller events to SMS.
//!
//! ```text
//!  controller ──notify()──▶ ledger ──try_send──▶ Outbox ──▶ delivery worker ──▶ MessagingPort
//!   (never blocks)          (dedupe)            (bounded)   (retry + pacing)
//! ```
//!
//! [`NotificationGateway::notify`] is fire-and-forget: it drops duplicates
//! per `(episode, kind)`, renders nothing, and never waits.  When the
//! outbox is full it holds up to [`BACKLOG_DEPTH`] events and hands them
//! over on later ticks.  The delivery
//! worker runs on its own thread under an `edge-executor`, retries each
//! send with backoff, paces consecutive messages, and logs (never raises)
//! permanent failure.

use core::fmt;
use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use heapless::Deque;
use log::{debug, error, info, warn};

use crate::app::ports::MessagingPort;
use crate::config::NotificationConfig;
use crate::config_store::ConfigStore;
use crate::error::HardwareError;
use crate::queue::SuppressionMethod;

// ───────────────────────────────────────────────────────────────
// Events and message text
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Detected,
    Suppressed,
    Failed,
}

impl NotificationKind {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Detected)
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Detected => "DETECTED",
            Self::Suppressed => "SUPPRESSED",
            Self::Failed => "FAILED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NotificationEvent {
    Detected {
        episode: u64,
        sector_deg: f32,
    },
    Suppressed {
        episode: u64,
        sector_deg: f32,
        method: SuppressionMethod,
    },
    Failed {
        episode: u64,
        sector_deg: f32,
        attempts: u32,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Detected { .. } => NotificationKind::Detected,
            Self::Suppressed { .. } => NotificationKind::Suppressed,
            Self::Failed { .. } => NotificationKind::Failed,
        }
    }

    pub fn episode(&self) -> u64 {
        match *self {
            Self::Detected { episode, .. }
            | Self::Suppressed { episode, .. }
            | Self::Failed { episode, .. } => episode,
        }
    }

    /// The SMS body.  Deterministic in the event.
    pub fn message(&self) -> String {
        match self {
            Self::Detected { sector_deg, .. } => {
                format!("Fire detected at sector {sector_deg:.1}° - AIPAWE responding")
            }
            Self::Suppressed {
                sector_deg, method, ..
            } => format!(
                "Fire suppressed successfully using {method} at sector {sector_deg:.1}°"
            ),
            Self::Failed {
                sector_deg,
                attempts,
                ..
            } => format!(
                "Suppression failed after {attempts} attempts at sector {sector_deg:.1}° - manual intervention required"
            ),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Notifier port
// ───────────────────────────────────────────────────────────────

/// Where the controller hands its notification events.  Must not block.
pub trait Notifier {
    fn notify(&mut self, event: NotificationEvent);

    /// Retry anything held back earlier.  Called once per control tick.
    fn flush(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// Outbox
// ───────────────────────────────────────────────────────────────

/// Outbox depth.  One episode produces two messages.
pub const OUTBOX_DEPTH: usize = 16;

pub enum OutboundMsg {
    Send(NotificationEvent),
    /// Stop the delivery worker once everything queued before it is sent.
    Shutdown,
}

pub type Outbox = Channel<CriticalSectionRawMutex, OutboundMsg, OUTBOX_DEPTH>;

// ───────────────────────────────────────────────────────────────
// Gateway (controller side)
// ───────────────────────────────────────────────────────────────

/// Remembered `(episode, terminal?)` keys.  Far more than can be in flight.
const LEDGER_DEPTH: usize = 32;

/// Events held while the outbox is full, in arrival order.
pub const BACKLOG_DEPTH: usize = 8;

pub struct NotificationGateway {
    outbox: Arc<Outbox>,
    ledger: Deque<(u64, bool), LEDGER_DEPTH>,
    backlog: Deque<NotificationEvent, BACKLOG_DEPTH>,
}

impl NotificationGateway {
    pub fn new(outbox: Arc<Outbox>) -> Self {
        Self {
            outbox,
            ledger: Deque::new(),
            backlog: Deque::new(),
        }
    }

    /// Events waiting for outbox space.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    fn remember(&mut self, key: (u64, bool)) {
        if self.ledger.is_full() {
            self.ledger.pop_front();
        }
        // Cannot fail: a slot was freed above.
        let _ = self.ledger.push_back(key);
    }
}

impl Notifier for NotificationGateway {
    fn notify(&mut self, event: NotificationEvent) {
        let kind = event.kind();
        let key = (event.episode(), kind.is_terminal());
        if self.ledger.iter().any(|k| *k == key) {
            debug!(
                "Notify: episode #{} {} already sent, skipping",
                key.0, kind
            );
            return;
        }

        // Older held events go first.
        self.flush();
        if self.backlog.is_empty() && self.outbox.try_send(OutboundMsg::Send(event)).is_ok() {
            debug!("Notify: episode #{} {} queued", key.0, kind);
            self.remember(key);
            return;
        }

        match self.backlog.push_back(event) {
            Ok(()) => {
                warn!(
                    "Notify: outbox full, holding episode #{} {} ({} held)",
                    key.0,
                    kind,
                    self.backlog.len()
                );
                self.remember(key);
            }
            Err(_) => error!(
                "Notify: outbox and backlog full, dropping episode #{} {}",
                key.0, kind
            ),
        }
    }

    fn flush(&mut self) {
        while let Some(event) = self.backlog.pop_front() {
            if let Err(TrySendError::Full(OutboundMsg::Send(event))) =
                self.outbox.try_send(OutboundMsg::Send(event))
            {
                // Cannot fail: the slot was just vacated.
                let _ = self.backlog.push_front(event);
                return;
            }
            debug!("Notify: held event released to the outbox");
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Delivery worker
// ───────────────────────────────────────────────────────────────

/// Retry and pacing knobs, read from the live config for every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub max_send_attempts: u8,
    pub retry_backoff: Duration,
    pub min_send_interval: Duration,
}

impl From<&NotificationConfig> for DeliveryPolicy {
    fn from(c: &NotificationConfig) -> Self {
        Self {
            max_send_attempts: c.max_send_attempts.max(1),
            retry_backoff: Duration::from_millis(u64::from(c.retry_backoff_ms)),
            min_send_interval: Duration::from_millis(u64::from(c.min_send_interval_ms)),
        }
    }
}

/// Send `text`, retrying with backoff.  Returns the attempt that succeeded.
pub async fn deliver<M: MessagingPort>(
    messenger: &mut M,
    text: &str,
    policy: &DeliveryPolicy,
) -> Result<u8, HardwareError> {
    let mut attempt = 1;
    loop {
        match messenger.send(text) {
            Ok(()) => return Ok(attempt),
            Err(e) if attempt >= policy.max_send_attempts => return Err(e),
            Err(e) => {
                warn!(
                    "SMS: attempt {}/{} failed ({}), retrying in {:?}",
                    attempt, policy.max_send_attempts, e, policy.retry_backoff
                );
                async_io_mini::Timer::after(policy.retry_backoff).await;
                attempt += 1;
            }
        }
    }
}

/// Drain the outbox until [`OutboundMsg::Shutdown`].
pub async fn delivery_loop<M: MessagingPort>(
    outbox: &Outbox,
    messenger: &mut M,
    store: &ConfigStore,
) {
    let mut last_sent: Option<Instant> = None;
    loop {
        let event = match outbox.receive().await {
            OutboundMsg::Send(event) => event,
            OutboundMsg::Shutdown => break,
        };
        let policy = DeliveryPolicy::from(&store.current().config.notification);

        if let Some(prev) = last_sent {
            let since = prev.elapsed();
            if since < policy.min_send_interval {
                async_io_mini::Timer::after(policy.min_send_interval - since).await;
            }
        }

        let text = event.message();
        match deliver(messenger, &text, &policy).await {
            Ok(attempt) => info!("SMS sent (attempt {}): {}", attempt, text),
            Err(e) => error!(
                "SMS permanently failed after {} attempts ({}): {}",
                policy.max_send_attempts, e, text
            ),
        }
        last_sent = Some(Instant::now());
    }
    info!("SMS: delivery worker stopped");
}

/// Thread body for the delivery worker.
pub fn run_delivery_worker<M: MessagingPort>(
    outbox: &Outbox,
    mut messenger: M,
    store: &ConfigStore,
) {
    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();
    let task = executor.spawn(delivery_loop(outbox, &mut messenger, store));
    futures_lite::future::block_on(executor.run(task));
}
