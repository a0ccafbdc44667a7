//! Fuzz target: `ConfigStore::reload`
//!
//! Feeds arbitrary bytes through both config encodings and verifies:
//! - No panics in fetching, decoding or validation
//! - A snapshot the store accepts always validates
//! - A rejected reload leaves the current snapshot untouched
//!
//! cargo fuzz run fuzz_config_decode

#![no_main]

use aipawe::app::ports::{ConfigError, ConfigSource, RawConfig};
use aipawe::config_store::ConfigStore;
use libfuzzer_sys::fuzz_target;

// ── In-memory ConfigSource for fuzz testing ───────────────────

struct Bytes(RawConfig);

impl ConfigSource for Bytes {
    fn fetch(&self) -> Result<RawConfig, ConfigError> {
        Ok(self.0.clone())
    }
}

fuzz_target!(|data: &[u8]| {
    let store = ConfigStore::default();

    let mut sources = vec![Bytes(RawConfig::Postcard(data.to_vec()))];
    if let Ok(text) = std::str::from_utf8(data) {
        sources.push(Bytes(RawConfig::Json(text.to_string())));
    }

    for source in &sources {
        let before = store.current();
        match store.reload(source) {
            Ok(snap) => assert_eq!(snap.config.validate(), Ok(())),
            Err(_) => assert_eq!(store.current(), before),
        }
    }
});
