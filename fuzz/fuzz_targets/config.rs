//! Fuzz target for config.toml parsing and validation.
//!
//! Malformed TOML, wrong types and out-of-range values must surface as
//! errors, never panics. A config that validates must also produce usable
//! pagination settings.

#![no_main]

use libfuzzer_sys::fuzz_target;

use apod_browse::config::FeedConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(content) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = FeedConfig::from_toml_str(content) else {
        return;
    };
    if config.validate().is_ok() {
        let settings = config.pagination_settings();
        assert!(settings.page_days >= 1);
        assert!(config.cache_capacity >= 1);
        let _ = config.request_timeout();
    }
});
