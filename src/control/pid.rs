//! PID controller for the heater duty fraction.
//!
//! Output is a fraction in `[0, 1]` consumed by the time-proportional
//! window.  The integral is stored as an already-scaled I-term so gains can
//! be swapped mid-run without a bump in output.  The derivative acts on the
//! measurement rather than the error, which keeps setpoint steps from
//! kicking the output.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

pub struct PidController {
    gains: PidGains,
    setpoint: f32,
    i_term: f32,
    prev_measurement: Option<f32>,
    output_min: f32,
    output_max: f32,
    last_output: f32,
}

impl PidController {
    pub fn new(kp: f32, ki: f32, kd: f32, setpoint: f32) -> Self {
        Self {
            gains: PidGains { kp, ki, kd },
            setpoint,
            i_term: 0.0,
            prev_measurement: None,
            output_min: 0.0,
            output_max: 1.0,
            last_output: 0.0,
        }
    }

    /// Set output limits
    pub fn set_limits(&mut self, min: f32, max: f32) {
        self.output_min = min;
        self.output_max = max;
        self.i_term = self.i_term.clamp(min, max);
    }

    /// Update setpoint
    pub fn set_target(&mut self, setpoint: f32) {
        self.setpoint = setpoint;
    }

    pub fn target(&self) -> f32 {
        self.setpoint
    }

    /// Replace the gains.  The accumulated I-term is left untouched.
    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn last_output(&self) -> f32 {
        self.last_output
    }

    /// Compute PID output given current measurement
    pub fn compute(&mut self, measurement: f32, dt: f32) -> f32 {
        let error = self.setpoint - measurement;

        // Integral, clamped to the output range (anti-windup)
        self.i_term =
            (self.i_term + self.gains.ki * error * dt).clamp(self.output_min, self.output_max);

        // Derivative on measurement
        let d = match self.prev_measurement {
            Some(prev) if dt > 0.0 => -self.gains.kd * (measurement - prev) / dt,
            _ => 0.0,
        };
        self.prev_measurement = Some(measurement);

        let output = (self.gains.kp * error + self.i_term + d).clamp(self.output_min, self.output_max);
        self.last_output = output;
        output
    }

    /// Reset controller state
    pub fn reset(&mut self) {
        self.i_term = 0.0;
        self.prev_measurement = None;
        self.last_output = 0.0;
    }
}
