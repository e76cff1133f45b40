//! Commands from the serving context to the control loop.
//!
//! ```text
//! ┌────────────────┐   Command   ┌──────────────┐
//! │ ControlHandle  │────────────▶│ Control Loop │
//! │ (any thread)   │  FIFO, 16   │ (owns HW)    │
//! └────────────────┘             └──────────────┘
//! ```
//!
//! Bounded `embassy-sync` channel: FIFO, each command received exactly
//! once, senders never block.  A full queue rejects the command instead
//! of growing.

use core::fmt;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

/// Queue depth.
pub const COMMAND_DEPTH: usize = 16;

/// Requests the loop acts on between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// End the current inter-tick wait and start the next tick now.
    AbortWaitEarly,
    /// Fill one station immediately.
    RunStationNow(usize),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AbortWaitEarly => write!(f, "wake"),
            Self::RunStationNow(i) => write!(f, "run station {i}"),
        }
    }
}

/// The queue was full; the command was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull(pub Command);

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command queue full, dropped \"{}\"", self.0)
    }
}

impl std::error::Error for QueueFull {}

pub struct CommandQueue {
    channel: Channel<CriticalSectionRawMutex, Command, COMMAND_DEPTH>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    pub fn push(&self, command: Command) -> Result<(), QueueFull> {
        self.channel.try_send(command).map_err(|_| QueueFull(command))
    }

    /// Oldest pending command, removed from the queue.
    pub fn pop(&self) -> Option<Command> {
        self.channel.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}
