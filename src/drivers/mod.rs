//! Pin resolution, actuator drivers and the fill state machine.

pub mod backend;
pub mod fill;
pub mod io;
pub mod pump;
pub mod timebase;
pub mod valve;
