//! Irrigo irrigation controller library.
//!
//! Exposes the HAL, the fill state machine, the program scheduler and the
//! control loop for the binary, integration tests and fuzzing.  Chip
//! drivers plug in behind the backend traits in [`drivers::backend`];
//! without them the controller runs in no-hardware mode.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod console;
pub mod control;
pub mod drivers;
pub mod error;
pub mod pins;
pub mod safety;
pub mod scheduler;
pub mod sensors;
