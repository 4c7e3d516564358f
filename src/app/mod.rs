//! Application core: pure domain logic, zero I/O.
//!
//! Business rules for the breadmaker: run orchestration, safety
//! evaluation, heater control, and fermentation tracking.  All interaction
//! with hardware and storage happens through **port traits** defined in
//! [`ports`], keeping this layer testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod queue;
pub mod service;
