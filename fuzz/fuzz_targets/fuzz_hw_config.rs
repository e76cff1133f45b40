//! Fuzz target: hardware configuration loader
//!
//! Feeds arbitrary text to `HardwareConfig::from_json` and checks:
//! - No panics on malformed or hostile documents
//! - Anything accepted re-validates after a serialize/parse cycle
//! - Anything accepted yields representable fill and settle times
//!
//! cargo fuzz run fuzz_hw_config

#![no_main]

use irrigo::config::HardwareConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = HardwareConfig::from_json(text) {
        let json = config.to_json().expect("accepted config serializes");
        let back = HardwareConfig::from_json(&json).expect("serialized config parses");
        assert_eq!(back, config);
        assert!(config.source.settle().is_ok());
        for station in &config.stations {
            assert!(config.source.flow_time_for(station.capacity_liters).is_ok());
            assert!(station.settle().is_ok());
        }
    }
});
