//! Outbound core events.
//!
//! The [`ControlCore`](super::service::ControlCore) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them: log a line, append to an activity log,
//! push to a display.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::fsm::StateId;

/// Structured lifecycle events emitted by the control core.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CoreEvent {
    /// The core has started (carries initial state).
    Started(StateId),

    /// The run state machine moved between states.
    StateChanged { from: StateId, to: StateId },

    ProgramSelected { program_id: u32, name: String },
    ProgramStarted { program_id: u32, name: String, stage_index: usize },
    /// Stopped by command before the last stage finished.
    ProgramStopped { program_id: Option<u32> },
    ProgramCompleted { program_id: u32, name: String },

    StageStarted {
        stage_index: usize,
        label: String,
        target_temp_c: f32,
        fermentation: bool,
    },
    StageCompleted { stage_index: usize, label: String, elapsed_secs: u64 },

    MixStepAdvanced { stage_index: usize, mix_index: usize },
    /// The mix pattern wrapped back to its first step.
    MixCycleCompleted { stage_index: usize, cycles: u32 },

    FermentationProgress {
        stage_index: usize,
        temp_c: f32,
        factor: f32,
        weighted_elapsed_secs: f64,
        planned_secs: u64,
    },

    ScheduledStartArmed { at: NaiveDateTime, stage_index: usize },

    /// Effective heater setpoint changed.
    TargetChanged { setpoint_c: f32 },

    ProfileSwitched { name: String },

    /// One or more safety fault bits were raised (carries the full mask).
    FaultDetected(u8),
    /// All safety fault bits have cleared.
    FaultCleared,

    EmergencyShutdown { reason: String },
}
