//! Temperature acquisition: raw ADC source, calibration, and smoothing.
//!
//! ```text
//!   RtdSensor ──raw──▶ CalibrationTable ──°C──▶ TemperatureFilter ──▶ core
//! ```

pub mod calibration;
pub mod filter;
pub mod rtd;
