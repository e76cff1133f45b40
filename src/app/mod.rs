//! Application core: domain orchestration, zero direct I/O.
//!
//! The loop-side [`service`] and the serving-side [`handle`] meet in
//! [`state`].  All interaction with hardware, storage and clocks happens
//! through the **port traits** in [`ports`], keeping this layer fully
//! testable without real peripherals.

pub mod commands;
pub mod events;
pub mod handle;
pub mod ports;
pub mod service;
pub mod state;
