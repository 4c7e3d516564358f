//! Inbound commands to the control core.
//!
//! These represent actions requested by the outside world (network
//! handlers, buttons, display menus) that the
//! [`ControlCore`](super::service::ControlCore) validates and applies
//! between ticks.  Each variant carries its own payload; validation
//! happens in the single dispatcher.

use serde::{Deserialize, Serialize};

/// A binary output the operator can drive directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Output {
    Heater,
    Motor,
    Light,
    Buzzer,
}

/// Commands that external adapters can send into the control core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoreCommand {
    /// Start now, or at the next `"HH:MM"`, from `stage` (default 0).
    Start { stage: Option<usize>, at_time: Option<String> },
    Stop,
    Pause,
    Resume,
    Advance,
    Back,
    SelectProgram(u32),

    SetManualMode(bool),
    SetManualSetpoint(f32),
    /// Heater and motor require manual mode.
    SetOutput { output: Output, on: bool },

    /// Replace the active stage's duration for this run.
    OverrideStageDuration { minutes: u32 },

    SetPid { kp: f32, ki: f32, kd: f32 },
    SwitchProfile(String),
    SetAutoSwitching(bool),
    SetWindowSize { window_ms: u32 },
    SetFilter { samples: usize, reject: usize, interval_ms: u32 },

    AddCalibrationPoint { raw: i32, temperature_c: f32 },
    UpdateCalibrationPoint { old_raw: i32, raw: i32, temperature_c: f32 },
    DeleteCalibrationPoint { raw: i32 },

    SetSafetyEnabled(bool),

    /// Persist pending settings immediately.
    SaveSettings,
}

impl CoreCommand {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Advance => "advance",
            Self::Back => "back",
            Self::SelectProgram(_) => "select_program",
            Self::SetManualMode(_) => "set_manual_mode",
            Self::SetManualSetpoint(_) => "set_manual_setpoint",
            Self::SetOutput { .. } => "set_output",
            Self::OverrideStageDuration { .. } => "override_stage_duration",
            Self::SetPid { .. } => "set_pid",
            Self::SwitchProfile(_) => "switch_profile",
            Self::SetAutoSwitching(_) => "set_auto_switching",
            Self::SetWindowSize { .. } => "set_window_size",
            Self::SetFilter { .. } => "set_filter",
            Self::AddCalibrationPoint { .. } => "add_calibration_point",
            Self::UpdateCalibrationPoint { .. } => "update_calibration_point",
            Self::DeleteCalibrationPoint { .. } => "delete_calibration_point",
            Self::SetSafetyEnabled(_) => "set_safety_enabled",
            Self::SaveSettings => "save_settings",
        }
    }
}
