//! Breadmaker appliance control core.
//!
//! Exposes the pure-logic modules for integration testing and the
//! firmware binary.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod control;
pub mod error;
pub mod fermentation;
pub mod fsm;
pub mod program;
pub mod safety;
pub mod scheduler;
pub mod sensors;

pub mod adapters;
pub mod drivers;
