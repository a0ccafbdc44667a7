//! Log-backed SMS adapter.
//!
//! Stands in for the GSM modem on a host: every message is written to the
//! log under the configured recipient.

use log::info;

use crate::app::ports::MessagingPort;
use crate::error::HardwareError;

pub struct LogMessenger {
    recipient: String,
    sent: u64,
}

impl LogMessenger {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            sent: 0,
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl MessagingPort for LogMessenger {
    fn send(&mut self, text: &str) -> Result<(), HardwareError> {
        self.sent += 1;
        info!("SMS | to={} | {}", self.recipient, text);
        Ok(())
    }
}
