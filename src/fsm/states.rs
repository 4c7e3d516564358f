//! Concrete state handler functions and table builder.
//!
//! ```text
//!            start / scheduled start due
//!   IDLE ───────────────────────────────▶ RUNNING ◀──┐
//!    ▲  ▲                                  │   │      │ resume
//!    │  └──────[last stage complete]───────┘   │      │
//!    │                                  pause / emergency
//!    │                                         ▼      │
//!    └───────────────[stop]─────────────── PAUSED ────┘
//! ```
//!
//! Stop and program selection reach Idle from any state through the
//! command path.

use super::context::{RunContext, StageAdvance};
use super::{StateDescriptor, StateId};
use crate::app::events::CoreEvent;
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 1: Running
        StateDescriptor {
            id: StateId::Running,
            name: "Running",
            on_enter: Some(running_enter),
            on_exit: Some(running_exit),
            on_update: running_update,
        },
        // Index 2: Paused
        StateDescriptor {
            id: StateId::Paused,
            name: "Paused",
            on_enter: Some(paused_enter),
            on_exit: Some(paused_exit),
            on_update: paused_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE state
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut RunContext) {
    ctx.run.is_running = false;
    ctx.run.paused_at_ms = None;
    ctx.setpoint_c = 0.0;
    ctx.motor_demand = false;
    info!("IDLE: heater and motor released");
}

fn idle_update(ctx: &mut RunContext) -> Option<StateId> {
    let scheduled = ctx.run.scheduled_start?;
    // A due start waits out the boot hold and fires once it ends.
    if !scheduled.is_due(ctx.wall_now()) || ctx.start_hold_remaining_ms > 0 {
        return None;
    }
    match ctx.begin_run(scheduled.stage_index) {
        Ok(()) => {
            info!("IDLE: scheduled start at {} fired", scheduled.at);
            Some(StateId::Running)
        }
        Err(e) => {
            warn!("IDLE: scheduled start dropped: {}", e);
            ctx.run.scheduled_start = None;
            ctx.run_dirty = true;
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  RUNNING state: stage timing, mixing, fermentation
// ═══════════════════════════════════════════════════════════════════════════

fn running_enter(ctx: &mut RunContext) {
    let paused_ms = ctx.thaw_timers();
    if paused_ms > 0 {
        info!("RUNNING: resumed after {} s paused", paused_ms / 1000);
    }
    ctx.run.is_running = true;
    // First entry into this stage only; a resume keeps the original.
    ctx.mark_stage_started();
    ctx.apply_stage_setpoint();
    ctx.run_dirty = true;
    if let Some(stage) = ctx.current_stage() {
        info!(
            "RUNNING: stage {} '{}' target {:.1}\u{00b0}C",
            ctx.run.stage_index, stage.label, stage.target_temp_c
        );
    }
}

fn running_exit(ctx: &mut RunContext) {
    ctx.motor_demand = false;
}

fn running_update(ctx: &mut RunContext) -> Option<StateId> {
    if ctx.current_stage().is_none() {
        warn!("RUNNING: no valid stage, stopping");
        ctx.abandon_program();
        return Some(StateId::Idle);
    }

    if ctx.stage_complete() {
        ctx.beep();
        match ctx.advance() {
            Ok(StageAdvance::Next(_)) => {}
            Ok(StageAdvance::Completed) => {
                complete_program(ctx);
                return Some(StateId::Idle);
            }
            Err(e) => {
                warn!("RUNNING: cannot advance ({}), stopping", e);
                ctx.abandon_program();
                return Some(StateId::Idle);
            }
        }
    }

    ctx.update_mix();
    ctx.apply_stage_setpoint();
    None
}

fn complete_program(ctx: &mut RunContext) {
    if let Some(program) = ctx.program.as_ref() {
        let event = CoreEvent::ProgramCompleted {
            program_id: program.id,
            name: program.name.clone(),
        };
        info!("RUNNING: program '{}' complete", program.name);
        ctx.push_event(event);
    }
    ctx.reset_run();
}

// ═══════════════════════════════════════════════════════════════════════════
//  PAUSED state: progress frozen, actuators released
// ═══════════════════════════════════════════════════════════════════════════

fn paused_enter(ctx: &mut RunContext) {
    ctx.freeze_timers();
    ctx.run.is_running = false;
    ctx.setpoint_c = 0.0;
    ctx.motor_demand = false;
    ctx.run_dirty = true;
    info!(
        "PAUSED: stage {} at {} s",
        ctx.run.stage_index,
        ctx.stage_elapsed_ms() / 1000
    );
}

fn paused_exit(_ctx: &mut RunContext) {
    info!("PAUSED: leaving pause");
}

fn paused_update(_ctx: &mut RunContext) -> Option<StateId> {
    None
}
