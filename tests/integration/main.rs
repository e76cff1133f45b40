//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  All tests run on the host with no real hardware
//! required; the HAL tests use the simulated expander and ADC.

mod control_loop_tests;
mod hal_tests;
mod handle_tests;
mod mock_hw;
mod service_tests;
