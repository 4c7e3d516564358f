//! Relay bank driver for heater, motor, light, and buzzer.
//!
//! Generic over `embedded_hal::digital::OutputPin`, so the same driver runs
//! on ESP-IDF `PinDriver`s and on host test doubles.  Levels are cached and
//! a pin is only written when its level changes.
//!
//! ## Safety contract
//!
//! The heater relay is a dumb actuator; gating by the safety monitor
//! happens in the core before a level reaches this driver.  A failed pin
//! write leaves the cached level unchanged so the next tick retries it.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::app::ports::ActuatorPort;

/// Electrical polarity of the relay inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

/// One relay channel with its last written level.
pub struct Relay<P: OutputPin> {
    pin: P,
    name: &'static str,
    polarity: Polarity,
    on: Option<bool>,
}

impl<P: OutputPin> Relay<P> {
    pub fn new(pin: P, name: &'static str, polarity: Polarity) -> Self {
        Self {
            pin,
            name,
            polarity,
            on: None,
        }
    }

    pub fn set(&mut self, on: bool) {
        if self.on == Some(on) {
            return;
        }
        let high = match self.polarity {
            Polarity::ActiveHigh => on,
            Polarity::ActiveLow => !on,
        };
        let result = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match result {
            Ok(()) => self.on = Some(on),
            Err(e) => warn!("Relay {}: pin write failed ({:?})", self.name, e),
        }
    }

    pub fn is_on(&self) -> bool {
        self.on == Some(true)
    }
}

/// The appliance's four binary outputs.
pub struct RelayBank<H: OutputPin, M: OutputPin, L: OutputPin, B: OutputPin> {
    heater: Relay<H>,
    motor: Relay<M>,
    light: Relay<L>,
    buzzer: Relay<B>,
}

impl<H: OutputPin, M: OutputPin, L: OutputPin, B: OutputPin> RelayBank<H, M, L, B> {
    /// Build the bank and drive every output off.
    pub fn new(heater: H, motor: M, light: L, buzzer: B, polarity: Polarity) -> Self {
        let mut bank = Self {
            heater: Relay::new(heater, "heater", polarity),
            motor: Relay::new(motor, "motor", polarity),
            light: Relay::new(light, "light", polarity),
            buzzer: Relay::new(buzzer, "buzzer", polarity),
        };
        bank.all_off();
        bank
    }

    pub fn heater_on(&self) -> bool {
        self.heater.is_on()
    }

    pub fn motor_on(&self) -> bool {
        self.motor.is_on()
    }
}

impl<H: OutputPin, M: OutputPin, L: OutputPin, B: OutputPin> ActuatorPort
    for RelayBank<H, M, L, B>
{
    fn set_heater(&mut self, on: bool) {
        self.heater.set(on);
    }

    fn set_motor(&mut self, on: bool) {
        self.motor.set(on);
    }

    fn set_light(&mut self, on: bool) {
        self.light.set(on);
    }

    fn set_buzzer(&mut self, on: bool) {
        self.buzzer.set(on);
    }
}
