//! System configuration parameters
//!
//! All tunable parameters for the breadmaker control core.  Values are
//! persisted through the settings store and can be changed at runtime by
//! commands; every change is range-checked by [`SystemConfig::validate`].

use serde::{Deserialize, Serialize};

use crate::control::profiles::{PidProfile, default_profiles};
use crate::control::window::WindowSettings;
use crate::error::ConfigFault;
use crate::safety::SafetyLimits;
use crate::sensors::calibration::CalibrationTable;
use crate::sensors::filter;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- PID ---
    /// Proportional gain (output fraction per °C)
    pub kp: f32,
    /// Integral gain (output fraction per °C·s)
    pub ki: f32,
    /// Derivative gain (output fraction per °C/s)
    pub kd: f32,
    /// PID evaluation period (milliseconds)
    pub pid_sample_ms: u32,

    // --- Time-proportional window ---
    pub window: WindowSettings,

    // --- Gain scheduling ---
    pub pid_profiles: Vec<PidProfile>,
    /// Profile restored at boot, if any
    pub active_profile: Option<String>,
    pub auto_switching: bool,
    /// Minimum spacing between profile band checks (milliseconds)
    pub profile_check_interval_ms: u32,

    // --- Temperature acquisition ---
    /// Filter ring size (5-50)
    pub temp_samples: usize,
    /// Samples dropped from each end before averaging (0-10)
    pub temp_reject: usize,
    /// Filter collection interval (milliseconds)
    pub temp_interval_ms: u32,
    pub calibration: CalibrationTable,

    // --- Safety ---
    pub safety: SafetyLimits,

    // --- Timing ---
    /// Control tick period (milliseconds)
    pub control_loop_interval_ms: u32,
    /// Settling time after boot before a program may start (milliseconds)
    pub startup_delay_ms: u32,
    /// Buzzer pulse on stage change / completion (milliseconds)
    pub buzzer_pulse_ms: u32,
    /// Quiet time after the last change before settings are written
    pub settings_save_delay_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // PID
            kp: 2.0,
            ki: 5.0,
            kd: 1.0,
            pid_sample_ms: 1000,

            // Window
            window: WindowSettings::default(), // 30 s, 2 s on / 5 s off floors

            // Gain scheduling
            pid_profiles: default_profiles(),
            active_profile: None,
            auto_switching: true,
            profile_check_interval_ms: 5000,

            // Temperature acquisition
            temp_samples: 10,
            temp_reject: 2,
            temp_interval_ms: 500,
            calibration: CalibrationTable::new(),

            // Safety
            safety: SafetyLimits::default(),

            // Timing
            control_loop_interval_ms: 100, // 10 Hz
            startup_delay_ms: 15_000,
            buzzer_pulse_ms: 200,
            settings_save_delay_ms: 5000,
        }
    }
}

/// Check PID gains against their permitted ranges.
pub fn validate_gains(kp: f32, ki: f32, kd: f32) -> Result<(), ConfigFault> {
    for (gain, value, max) in [("kp", kp, 100.0), ("ki", ki, 50.0), ("kd", kd, 100.0)] {
        if !(0.0..=max).contains(&value) {
            return Err(ConfigFault::GainOutOfRange { gain, value });
        }
    }
    Ok(())
}

/// Check window length and the on/off floors.
pub fn validate_window(w: &WindowSettings) -> Result<(), ConfigFault> {
    check_range("window_ms", w.window_ms, 5_000, 120_000)?;
    if w.min_on_ms + w.min_off_ms >= w.window_ms {
        return Err(ConfigFault::WindowFloorsTooLarge);
    }
    Ok(())
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), ConfigFault> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigFault::OutOfRange { field, value })
    }
}

impl SystemConfig {
    /// Range-check every field.  The first violation is returned.
    pub fn validate(&self) -> Result<(), ConfigFault> {
        validate_gains(self.kp, self.ki, self.kd)?;
        check_range("pid_sample_ms", self.pid_sample_ms, 100, 120_000)?;
        validate_window(&self.window)?;
        filter::validate_params(self.temp_samples, self.temp_reject)?;
        check_range("temp_interval_ms", self.temp_interval_ms, 100, 5_000)?;
        check_range("control_loop_interval_ms", self.control_loop_interval_ms, 10, 1_000)?;
        for p in &self.pid_profiles {
            validate_gains(p.kp, p.ki, p.kd)?;
        }
        Ok(())
    }
}
