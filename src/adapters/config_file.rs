//! File-backed [`ConfigSource`].
//!
//! `*.bin` / `*.postcard` files are read as postcard bytes; anything else
//! is read as JSON text.  The file is re-read on every fetch so edits are
//! picked up by the next reload.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;

use crate::app::ports::{ConfigError, ConfigSource, RawConfig};

pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_binary(&self) -> bool {
        matches!(
            self.path.extension().and_then(|e| e.to_str()),
            Some("bin" | "postcard")
        )
    }
}

impl ConfigSource for FileConfigSource {
    fn fetch(&self) -> Result<RawConfig, ConfigError> {
        let bytes = std::fs::read(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::NotFound,
            _ => ConfigError::IoError,
        })?;
        debug!(
            "FileConfigSource: read {} bytes from {}",
            bytes.len(),
            self.path.display()
        );

        if self.is_binary() {
            return Ok(RawConfig::Postcard(bytes));
        }
        String::from_utf8(bytes)
            .map(RawConfig::Json)
            .map_err(|e| ConfigError::Corrupted(e.to_string()))
    }
}
