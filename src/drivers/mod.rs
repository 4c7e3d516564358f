//! Actuator drivers and peripheral helpers.

pub mod relay;
pub mod watchdog;
