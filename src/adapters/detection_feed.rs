//! Detection feed — single-producer / single-consumer channel between the
//! detector (camera + inference, or the operator console on a host) and
//! the controller's [`DetectionPort`](crate::app::ports::DetectionPort).
//!
//! The producer never blocks: when the controller falls behind, new
//! detections are dropped with a warning rather than stalling the camera.

use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::fsm::context::Detection;

/// Buffered detections.  Roughly two seconds of frames.
pub const FEED_DEPTH: usize = 32;

type FeedChannel = Channel<CriticalSectionRawMutex, Detection, FEED_DEPTH>;

#[derive(Clone)]
pub struct DetectionFeed {
    channel: Arc<FeedChannel>,
}

impl Default for DetectionFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionFeed {
    pub fn new() -> Self {
        Self {
            channel: Arc::new(Channel::new()),
        }
    }

    /// Producer side.  Returns `false` if the detection was dropped.
    pub fn push(&self, det: Detection) -> bool {
        if self.channel.try_send(det).is_err() {
            warn!(
                "DetectionFeed: full, dropping {:.1}° conf {:.3}",
                det.sector_angle, det.confidence
            );
            return false;
        }
        true
    }

    /// Consumer side.  Never blocks.
    pub fn poll(&self) -> Option<Detection> {
        self.channel.try_receive().ok()
    }
}
