//! Versioned, hot-swappable configuration.
//!
//! The store holds an `Arc<ConfigSnapshot>`.  Readers clone the `Arc` under
//! a critical section and never wait on parsing or validation; a reload
//! does all of its work first and swaps the pointer last, so a snapshot is
//! either fully published or not at all.

use core::cell::RefCell;
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, info, warn};

use crate::app::ports::{ConfigError, ConfigSource, RawConfig};
use crate::config::SystemConfig;

/// An immutable, validated configuration with its publish number.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub config: SystemConfig,
}

pub struct ConfigStore {
    current: Mutex<CriticalSectionRawMutex, RefCell<Arc<ConfigSnapshot>>>,
}

impl ConfigStore {
    /// Create a store whose first snapshot (version 1) is `config`.
    pub fn new(config: SystemConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            current: Mutex::new(RefCell::new(Arc::new(ConfigSnapshot { version: 1, config }))),
        })
    }

    /// Latest validated snapshot.  Never blocks on a reload in progress.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.current.lock(|cell| Arc::clone(&*cell.borrow()))
    }

    /// Fetch, decode, validate and publish.
    ///
    /// On any error the previous snapshot stays active.  Content equal to
    /// the current snapshot is not republished and keeps its version.
    pub fn reload(&self, source: &dyn ConfigSource) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        let result = source
            .fetch()
            .and_then(|raw| decode(&raw))
            .and_then(|config| self.publish(config));
        if let Err(e) = &result {
            warn!(
                "ConfigStore: reload rejected, keeping v{}: {}",
                self.current().version,
                e
            );
        }
        result
    }

    /// Validate and publish an already-decoded config.
    pub fn publish(&self, config: SystemConfig) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        config.validate()?;

        let (snapshot, changed) = self.current.lock(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.config == config {
                return (Arc::clone(&*slot), false);
            }
            let next = Arc::new(ConfigSnapshot {
                version: slot.version + 1,
                config,
            });
            *slot = Arc::clone(&next);
            (next, true)
        });

        if changed {
            info!("ConfigStore: published v{}", snapshot.version);
        } else {
            debug!("ConfigStore: unchanged, staying at v{}", snapshot.version);
        }
        Ok(snapshot)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            current: Mutex::new(RefCell::new(Arc::new(ConfigSnapshot {
                version: 1,
                config: SystemConfig::default(),
            }))),
        }
    }
}

/// Decode raw config without validating it.
pub fn decode(raw: &RawConfig) -> Result<SystemConfig, ConfigError> {
    match raw {
        RawConfig::Json(text) => {
            serde_json::from_str(text).map_err(|e| ConfigError::Corrupted(e.to_string()))
        }
        RawConfig::Postcard(bytes) => {
            postcard::from_bytes(bytes).map_err(|e| ConfigError::Corrupted(e.to_string()))
        }
    }
}
