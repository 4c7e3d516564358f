//! Hardware adapter: bridges real peripherals to domain port traits.
//!
//! Pairs the temperature source with the relay bank so the core's `tick`
//! can take a single `SensorPort + ActuatorPort` value.  This is the only
//! module in the system that touches actual hardware; on non-espidf
//! targets the parts are simulation doubles.

use crate::app::ports::{ActuatorPort, SensorPort};
use crate::error::SensorError;

/// Concrete adapter that combines sensor and outputs behind port traits.
pub struct HardwareAdapter<S, A> {
    sensor: S,
    outputs: A,
}

impl<S: SensorPort, A: ActuatorPort> HardwareAdapter<S, A> {
    pub fn new(sensor: S, outputs: A) -> Self {
        Self { sensor, outputs }
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn outputs(&self) -> &A {
        &self.outputs
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl<S: SensorPort, A> SensorPort for HardwareAdapter<S, A> {
    fn read_raw_adc(&mut self) -> Result<i32, SensorError> {
        self.sensor.read_raw_adc()
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl<S, A: ActuatorPort> ActuatorPort for HardwareAdapter<S, A> {
    fn set_heater(&mut self, on: bool) {
        self.outputs.set_heater(on);
    }

    fn set_motor(&mut self, on: bool) {
        self.outputs.set_motor(on);
    }

    fn set_light(&mut self, on: bool) {
        self.outputs.set_light(on);
    }

    fn set_buzzer(&mut self, on: bool) {
        self.outputs.set_buzzer(on);
    }
}
