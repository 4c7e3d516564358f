//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ControlCore (domain)
//! ```
//!
//! Driven adapters (sensor, relays, clock, event sinks, storage) implement
//! these traits.  The [`ControlCore`](super::service::ControlCore) consumes
//! them via generics, so the domain core never touches hardware directly.

use chrono::NaiveDateTime;

use crate::config::SystemConfig;
use crate::error::SensorError;
use crate::fsm::context::ResumeSnapshot;
use crate::program::{Program, ProgramMetadata};

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Raw temperature source, polled once per filter interval.
pub trait SensorPort {
    fn read_raw_adc(&mut self) -> Result<i32, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Binary outputs.  Called every tick with the desired level; adapters
/// should make repeated calls with the same level cheap.
pub trait ActuatorPort {
    fn set_heater(&mut self, on: bool);
    fn set_motor(&mut self, on: bool);
    fn set_light(&mut self, on: bool);
    fn set_buzzer(&mut self, on: bool);

    /// Everything off.
    fn all_off(&mut self) {
        self.set_heater(false);
        self.set_motor(false);
        self.set_light(false);
        self.set_buzzer(false);
    }
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

pub trait ClockPort {
    /// Milliseconds since boot; never goes backwards.
    fn monotonic_ms(&self) -> u64;

    /// Local wall-clock time, for scheduled starts and stage timestamps.
    fn local_now(&self) -> NaiveDateTime;

    /// Microseconds since boot, for loop timing.
    fn monotonic_us(&self) -> u64 {
        self.monotonic_ms() * 1000
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / activity log)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`CoreEvent`](super::events::CoreEvent)s
/// through this port.  Emission is fire-and-forget.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::CoreEvent);
}

// ───────────────────────────────────────────────────────────────
// Program store
// ───────────────────────────────────────────────────────────────

pub trait ProgramStore {
    fn load_program_metadata(&self) -> Result<Vec<ProgramMetadata>, StoreError>;
    fn load_program(&self, id: u32) -> Result<Program, StoreError>;
    fn save_program(&mut self, program: &Program) -> Result<(), StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Settings store
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`SystemConfig`].
///
/// Implementations validate before persisting and reject out-of-range
/// values with [`SettingsError::ValidationFailed`] rather than clamping.
pub trait SettingsStore {
    /// Returns [`SettingsError::NotFound`] on first boot.
    fn load(&self) -> Result<SystemConfig, SettingsError>;
    fn save(&self, config: &SystemConfig) -> Result<(), SettingsError>;
}

// ───────────────────────────────────────────────────────────────
// Resume store
// ───────────────────────────────────────────────────────────────

/// Keeps the last run snapshot across power cycles.
pub trait ResumeStore {
    fn load_resume(&self) -> Result<Option<ResumeSnapshot>, SettingsError>;
    fn save_resume(&self, snapshot: &ResumeSnapshot) -> Result<(), SettingsError>;
    fn clear_resume(&self) -> Result<(), SettingsError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`SettingsStore`] and [`ResumeStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsError {
    /// Nothing stored yet (first boot).
    NotFound,
    /// Stored blob failed to deserialize.
    Corrupted,
    /// A field failed range validation.
    ValidationFailed(&'static str),
    StorageFull,
    IoError,
}

/// Errors from [`ProgramStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    NotFound(u32),
    /// Program data failed to parse.
    Malformed,
    IoError,
}

impl core::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "settings not found"),
            Self::Corrupted => write!(f, "settings corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "program {} not found", id),
            Self::Malformed => write!(f, "program data malformed"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
