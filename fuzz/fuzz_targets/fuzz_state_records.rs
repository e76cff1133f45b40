//! Fuzz target: persisted state records
//!
//! Decodes arbitrary bytes as each of the three stored records.  A
//! corrupted file must produce an error, never a panic or an invalid
//! record that slips past validation unnoticed.
//!
//! cargo fuzz run fuzz_state_records

#![no_main]

use irrigo::adapters::state_store::decode_record;
use irrigo::config::{GeneralSettings, HardwareSettings};
use irrigo::scheduler::Program;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(general) = decode_record::<GeneralSettings>(data) {
        let _ = general.validate();
    }
    if let Ok(hardware) = decode_record::<HardwareSettings>(data) {
        let _ = hardware.validate(hardware.stations.len());
    }
    if let Ok(programs) = decode_record::<Vec<Program>>(data) {
        for p in &programs {
            let _ = p.validate(8);
        }
    }
});
