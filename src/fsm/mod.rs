//! Function-pointer finite state machine engine.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  StateTable                                              │
//! │  ┌─────────┬───────────┬──────────┬───────────────────┐  │
//! │  │ StateId │ on_enter  │ on_exit  │ on_update         │  │
//! │  ├─────────┼───────────┼──────────┼───────────────────┤  │
//! │  │ Idle    │ fn(ctx)   │ -        │ fn(ctx)->Option<> │  │
//! │  │ Running │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  │ Paused  │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  └─────────┴───────────┴──────────┴───────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer.  All functions receive `&mut RunContext`, the
//! blackboard holding run state, the active program, fermentation
//! tracking, and the stage-driven outputs.
//!
//! Only two transitions are time-driven: a due scheduled start
//! (Idle → Running) and completion of the last stage (Running → Idle).
//! Everything else arrives as a command and goes through
//! [`Fsm::force_transition`].

pub mod context;
pub mod states;

use context::RunContext;
use log::info;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Run states of the program state machine.  The discriminant is the row
/// in the table built by [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StateId {
    Idle = 0,
    Running = 1,
    Paused = 2,
}

impl StateId {
    pub const COUNT: usize = 3;

    const fn row(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// Handler signatures and table rows
// ---------------------------------------------------------------------------

/// `on_enter` / `on_exit`: run once per transition.
pub type StateActionFn = fn(&mut RunContext);

/// Per-tick handler.  `Some(next)` requests a transition.
pub type StateUpdateFn = fn(&mut RunContext) -> Option<StateId>;

pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    table: [StateDescriptor; StateId::COUNT],
    current: StateId,
    previous: Option<StateId>,
    ticks: u64,
    entered_at_tick: u64,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        debug_assert!(
            table.iter().enumerate().all(|(row, d)| d.id.row() == row),
            "state table rows out of order"
        );
        Self {
            table,
            current: initial,
            previous: None,
            ticks: 0,
            entered_at_tick: 0,
        }
    }

    /// Enter the initial state.  Call once before the first [`tick`](Self::tick).
    pub fn start(&mut self, ctx: &mut RunContext) {
        info!("FSM starting in {}", self.state_name());
        if let Some(enter) = self.row().on_enter {
            enter(ctx);
        }
    }

    /// Run the current state's update handler and follow any transition
    /// it requests.
    pub fn tick(&mut self, ctx: &mut RunContext) {
        self.ticks += 1;
        if let Some(next) = (self.row().on_update)(ctx) {
            self.transition(next, ctx);
        }
    }

    /// Transition on behalf of a command or the safety path.  Targeting
    /// the current state does nothing.
    pub fn force_transition(&mut self, next: StateId, ctx: &mut RunContext) {
        if next != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> StateId {
        self.current
    }

    pub fn previous_state(&self) -> Option<StateId> {
        self.previous
    }

    pub fn state_name(&self) -> &'static str {
        self.row().name
    }

    pub fn ticks_in_current_state(&self) -> u64 {
        self.ticks - self.entered_at_tick
    }

    fn row(&self) -> &StateDescriptor {
        &self.table[self.current.row()]
    }

    fn transition(&mut self, next: StateId, ctx: &mut RunContext) {
        info!(
            "FSM: {} -> {}",
            self.state_name(),
            self.table[next.row()].name
        );
        if let Some(exit) = self.row().on_exit {
            exit(ctx);
        }
        self.previous = Some(self.current);
        self.current = next;
        self.entered_at_tick = self.ticks;
        if let Some(enter) = self.row().on_enter {
            enter(ctx);
        }
    }
}
