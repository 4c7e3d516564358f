//! Command queue between producer tasks and the control loop.
//!
//! Network handlers, buttons, and the display submit [`CoreCommand`]s from
//! their own tasks.  The control loop drains the queue between ticks, so
//! every command is applied against a consistent run state and every
//! outcome is published back on the response channel.
//!
//! ```text
//! ┌──────────────┐  CommandRequest  ┌──────────────┐
//! │  UI / net    │────────────────▶│ Control loop │
//! │  tasks       │◀────────────────│  (sync)      │
//! └──────────────┘  CommandOutcome  └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use super::commands::CoreCommand;
use crate::error::Error;

/// Inbound command tagged with the submitter's request id.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub request_id: u32,
    pub command: CoreCommand,
}

/// Result of one applied command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub request_id: u32,
    pub result: Result<(), Error>,
}

/// Channel depth for inbound commands.
pub const CMD_DEPTH: usize = 8;

/// Channel depth for outcomes.
pub const RESP_DEPTH: usize = 16;

/// Bounded command/outcome channel pair.
pub struct CommandQueue<const CMD: usize, const RESP: usize> {
    commands: Channel<CriticalSectionRawMutex, CommandRequest, CMD>,
    outcomes: Channel<CriticalSectionRawMutex, CommandOutcome, RESP>,
}

/// Queue shared by the firmware tasks.
pub static COMMAND_QUEUE: CommandQueue<CMD_DEPTH, RESP_DEPTH> = CommandQueue::new();

impl<const CMD: usize, const RESP: usize> CommandQueue<CMD, RESP> {
    pub const fn new() -> Self {
        Self {
            commands: Channel::new(),
            outcomes: Channel::new(),
        }
    }

    /// Enqueue a command.  Returns `false` when the queue is full.
    pub fn submit(&self, request_id: u32, command: CoreCommand) -> bool {
        match self.commands.try_send(CommandRequest {
            request_id,
            command,
        }) {
            Ok(()) => true,
            Err(_) => {
                warn!("Command queue full, request {} dropped", request_id);
                false
            }
        }
    }

    /// Apply every queued command in arrival order and publish outcomes.
    /// Returns the number of commands applied.
    pub fn drain(&self, mut apply: impl FnMut(CoreCommand) -> Result<(), Error>) -> usize {
        let mut applied = 0;
        while let Ok(request) = self.commands.try_receive() {
            let result = apply(request.command);
            applied += 1;
            let outcome = CommandOutcome {
                request_id: request.request_id,
                result,
            };
            if self.outcomes.try_send(outcome).is_err() {
                warn!(
                    "Outcome channel full, result of request {} lost",
                    request.request_id
                );
            }
        }
        applied
    }

    /// Take the oldest published outcome, if any.
    pub fn try_outcome(&self) -> Option<CommandOutcome> {
        self.outcomes.try_receive().ok()
    }

    pub fn pending(&self) -> usize {
        self.commands.len()
    }
}

impl<const CMD: usize, const RESP: usize> Default for CommandQueue<CMD, RESP> {
    fn default() -> Self {
        Self::new()
    }
}
