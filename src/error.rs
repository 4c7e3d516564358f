//! Unified error types for the breadmaker control core.
//!
//! Every command handler returns [`Result`]; a rejected command leaves core
//! state untouched and hands the caller an [`Error`] whose [`Error::category`]
//! and `Display` text together form the user-visible reason.  All variants
//! are `Copy` so they can be queued, logged and returned without allocation.

use core::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible core operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// A parameter failed range or format validation.
    Config(ConfigFault),
    /// The active program is missing, empty, or could not be loaded.
    Program(ProgramFault),
    /// The command is not valid in the current run state.
    Command(CommandFault),
    /// The raw temperature source could not be read.
    Sensor(SensorError),
    /// A safety interlock blocked the operation.
    Safety(SafetyFault),
}

/// Stable error category reported alongside the reason string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    Configuration,
    ProgramData,
    Precondition,
    SensorFault,
    SafetyFault,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Program(_) => ErrorCategory::ProgramData,
            Self::Command(_) => ErrorCategory::Precondition,
            Self::Sensor(_) => ErrorCategory::SensorFault,
            Self::Safety(_) => ErrorCategory::SafetyFault,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Program(e) => write!(f, "program: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Safety(e) => write!(f, "safety: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFault {
    /// A PID gain is outside its allowed range.
    GainOutOfRange { gain: &'static str, value: f32 },
    /// Requested stage index does not exist in the active program.
    InvalidStageIndex { index: usize, stage_count: usize },
    /// A start time was not a valid `HH:MM` string.
    InvalidTimeString,
    /// Sample count / reject count combination leaves fewer than 3 samples
    /// or is outside the permitted ranges.
    InvalidFilterParams { samples: usize, reject: usize },
    /// A millisecond parameter is outside its allowed range.
    OutOfRange { field: &'static str, value: u32 },
    /// Window length cannot accommodate both the min-on and min-off floors.
    WindowFloorsTooLarge,
    /// A temperature setpoint is outside the safe range.
    InvalidSetpoint(f32),
    /// Stage duration override must be at least one minute.
    InvalidDuration,
    /// No gain profile with the requested name.
    UnknownProfile,
    /// A calibration point with this raw value already exists.
    DuplicateCalibrationPoint(i32),
    /// No calibration point with this raw value.
    CalibrationPointNotFound(i32),
    /// The calibration table is at capacity.
    CalibrationTableFull,
}

impl fmt::Display for ConfigFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GainOutOfRange { gain, value } => write!(f, "{gain} out of range ({value})"),
            Self::InvalidStageIndex { index, stage_count } => {
                write!(f, "invalid stage index {index} (program has {stage_count} stages)")
            }
            Self::InvalidTimeString => write!(f, "invalid time, expected HH:MM"),
            Self::InvalidFilterParams { samples, reject } => write!(
                f,
                "invalid filter parameters: {samples} samples with {reject} rejected per side"
            ),
            Self::OutOfRange { field, value } => write!(f, "{field} out of range ({value})"),
            Self::WindowFloorsTooLarge => {
                write!(f, "min on-time plus min off-time must be shorter than the window")
            }
            Self::InvalidSetpoint(t) => write!(f, "setpoint {t:.1} outside safe range"),
            Self::InvalidDuration => write!(f, "stage duration must be at least 1 minute"),
            Self::UnknownProfile => write!(f, "no PID profile with that name"),
            Self::DuplicateCalibrationPoint(raw) => {
                write!(f, "calibration point for raw {raw} already exists")
            }
            Self::CalibrationPointNotFound(raw) => {
                write!(f, "no calibration point for raw {raw}")
            }
            Self::CalibrationTableFull => write!(f, "calibration table full"),
        }
    }
}

impl ConfigFault {
    /// Name of the offending setting, for storage-layer rejections.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::GainOutOfRange { gain, .. } => *gain,
            Self::InvalidStageIndex { .. } => "stage_index",
            Self::InvalidTimeString => "start_time",
            Self::InvalidFilterParams { .. } => "temp_samples",
            Self::OutOfRange { field, .. } => *field,
            Self::WindowFloorsTooLarge => "window",
            Self::InvalidSetpoint(_) => "setpoint",
            Self::InvalidDuration => "duration_minutes",
            Self::UnknownProfile => "active_profile",
            Self::DuplicateCalibrationPoint(_)
            | Self::CalibrationPointNotFound(_)
            | Self::CalibrationTableFull => "calibration",
        }
    }
}

impl From<ConfigFault> for Error {
    fn from(e: ConfigFault) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Program-data faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramFault {
    /// No program has been selected.
    NoProgramSelected,
    /// The requested id is not in the program metadata.
    NotFound(u32),
    /// The program defines no stages.
    NoStages,
    /// The program store could not be read.
    StoreFailure,
    /// A persisted run snapshot does not match the program it references.
    SnapshotMismatch,
}

impl fmt::Display for ProgramFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoProgramSelected => write!(f, "no program selected"),
            Self::NotFound(id) => write!(f, "program {id} not found"),
            Self::NoStages => write!(f, "program has no stages"),
            Self::StoreFailure => write!(f, "program store failure"),
            Self::SnapshotMismatch => write!(f, "resume snapshot does not match program"),
        }
    }
}

impl From<ProgramFault> for Error {
    fn from(e: ProgramFault) -> Self {
        Self::Program(e)
    }
}

// ---------------------------------------------------------------------------
// Command precondition faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFault {
    NotRunning,
    NotPaused,
    /// Boot settling period has not elapsed yet.
    StartupDelay { remaining_ms: u64 },
    /// Direct heater/motor control is only allowed in manual mode.
    NotManualMode,
}

impl fmt::Display for CommandFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRunning => write!(f, "program is not running"),
            Self::NotPaused => write!(f, "program is not paused"),
            Self::StartupDelay { remaining_ms } => {
                write!(f, "startup delay active, {} s remaining", remaining_ms.div_ceil(1000))
            }
            Self::NotManualMode => write!(f, "manual mode is off"),
        }
    }
}

impl From<CommandFault> for Error {
    fn from(e: CommandFault) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// ADC read returned an error or timed out.
    AdcReadFailed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdcReadFailed => write!(f, "ADC read failed"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Safety faults
// ---------------------------------------------------------------------------

/// Safety conditions tracked by the monitor as a bitfield so several can be
/// active at once and cleared individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SafetyFault {
    /// Invalid-reading streak exceeded its threshold.
    SensorInvalid = 0b0000_0001,
    /// Zero-reading streak exceeded its threshold.
    SensorZero = 0b0000_0010,
    /// Temperature at or above the safe operating limit.
    OverTemperature = 0b0000_0100,
    /// Temperature at or above the emergency limit.
    EmergencyTemperature = 0b0000_1000,
    /// Heater on without the expected temperature rise.
    HeatingIneffective = 0b0001_0000,
    /// PID output pinned at full scale for too long.
    PidSaturated = 0b0010_0000,
    /// A control tick took longer than the critical threshold.
    LoopOverrun = 0b0100_0000,
    /// Emergency shutdown latched.
    EmergencyShutdown = 0b1000_0000,
}

impl SafetyFault {
    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SafetyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SensorInvalid => write!(f, "temperature sensor invalid"),
            Self::SensorZero => write!(f, "temperature sensor reading zero"),
            Self::OverTemperature => write!(f, "over safe temperature"),
            Self::EmergencyTemperature => write!(f, "emergency temperature"),
            Self::HeatingIneffective => write!(f, "heating ineffective"),
            Self::PidSaturated => write!(f, "PID output saturated"),
            Self::LoopOverrun => write!(f, "control loop overrun"),
            Self::EmergencyShutdown => write!(f, "emergency shutdown active"),
        }
    }
}

impl From<SafetyFault> for Error {
    fn from(e: SafetyFault) -> Self {
        Self::Safety(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
