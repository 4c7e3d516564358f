//! Safety monitor.
//!
//! Fed once per filter sample through [`SafetyMonitor::record_reading`]
//! (sensor validity streaks) and evaluated **every tick before the
//! controller** against the filtered temperature, the heater relay level
//! applied on the previous tick, and the PID output.  Conditions are tracked in a fault bitmask
//! (see [`SafetyFault`]).
//!
//! ## Fault lifecycle
//!
//! 1. Sensor faults (invalid or zero streaks) disable the heater while they
//!    last and clear on the next valid reading.  The run itself is left alone.
//! 2. Over-temperature at the safe limit is a warning only.
//! 3. Emergency temperature latches `emergency_shutdown` at once.  Heating
//!    that stays ineffective for `max_heating_time_ms` after the first
//!    failed rise check latches it too.  The latch survives every later evaluation and
//!    is cleared only by turning the safety system off.

use core::fmt::Write as _;

use heapless::String;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::SafetyFault;

/// Tunable thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    pub min_valid_temp_c: f32,
    pub max_valid_temp_c: f32,
    pub max_invalid_streak: u32,
    pub max_zero_streak: u32,
    pub max_safe_temp_c: f32,
    pub emergency_temp_c: f32,
    pub heating_check_interval_ms: u64,
    pub min_temp_rise_c: f32,
    pub max_heating_time_ms: u64,
    pub max_saturation_ms: u64,
    pub saturation_output: f32,
    pub critical_loop_us: u64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            min_valid_temp_c: -10.0,
            max_valid_temp_c: 250.0,
            max_invalid_streak: 5,
            max_zero_streak: 3,
            max_safe_temp_c: 235.0,
            emergency_temp_c: 240.0,
            heating_check_interval_ms: 30_000,
            min_temp_rise_c: 2.0,
            max_heating_time_ms: 300_000, // 5 min
            max_saturation_ms: 600_000,   // 10 min
            saturation_output: 0.99,
            critical_loop_us: 1_000_000,
        }
    }
}

/// Snapshot of the monitor for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyState {
    pub temperature_valid: bool,
    pub invalid_temp_streak: u32,
    pub zero_temp_streak: u32,
    pub heating_effective: bool,
    pub heating_start_ms: Option<u64>,
    pub heating_start_temp_c: f32,
    pub ineffective_since_ms: Option<u64>,
    pub pid_saturated_since_ms: Option<u64>,
    pub pid_saturated: bool,
    pub over_temp_warning: bool,
    pub emergency_shutdown: bool,
    pub shutdown_reason: std::string::String,
    pub shutdown_time_ms: Option<u64>,
    pub safety_enabled: bool,
    pub fault_flags: u8,
    pub max_loop_us: u64,
    pub avg_loop_us: u64,
    pub loop_overrun: bool,
}

pub struct SafetyMonitor {
    limits: SafetyLimits,
    safety_enabled: bool,
    faults: u8,

    temperature_valid: bool,
    invalid_streak: u32,
    zero_streak: u32,

    heating_effective: bool,
    /// Start of the current continuous heater-on period.
    heating_start_ms: Option<u64>,
    heating_start_temp_c: f32,
    /// First failed rise check of the current ineffective spell.
    ineffective_since_ms: Option<u64>,
    /// Baseline of the current effectiveness check interval.
    check_start_ms: u64,
    check_start_temp_c: f32,

    saturated_since_ms: Option<u64>,

    emergency: bool,
    shutdown_reason: String<64>,
    shutdown_time_ms: Option<u64>,

    max_loop_us: u64,
    total_loop_us: u64,
    loop_samples: u64,
}

impl SafetyMonitor {
    pub fn new(limits: SafetyLimits) -> Self {
        Self {
            limits,
            safety_enabled: true,
            faults: 0,
            temperature_valid: true,
            invalid_streak: 0,
            zero_streak: 0,
            heating_effective: true,
            heating_start_ms: None,
            heating_start_temp_c: 0.0,
            ineffective_since_ms: None,
            check_start_ms: 0,
            check_start_temp_c: 0.0,
            saturated_since_ms: None,
            emergency: false,
            shutdown_reason: String::new(),
            shutdown_time_ms: None,
            max_loop_us: 0,
            total_loop_us: 0,
            loop_samples: 0,
        }
    }

    pub fn set_limits(&mut self, limits: SafetyLimits) {
        self.limits = limits;
    }

    /// Count a fresh filtered reading toward the validity streaks.  A
    /// failed sensor read is passed as NaN.  Returns `temperature_valid`.
    pub fn record_reading(&mut self, temp_c: f32) -> bool {
        let l = self.limits;
        let zero = temp_c == 0.0;
        let invalid = zero || !(l.min_valid_temp_c..=l.max_valid_temp_c).contains(&temp_c);
        if invalid {
            self.invalid_streak = self.invalid_streak.saturating_add(1);
            self.zero_streak = if zero { self.zero_streak.saturating_add(1) } else { 0 };
        } else {
            self.invalid_streak = 0;
            self.zero_streak = 0;
        }
        let invalid_exceeded = self.invalid_streak >= l.max_invalid_streak;
        let zero_exceeded = self.zero_streak >= l.max_zero_streak;
        self.eval_fault(SafetyFault::SensorInvalid, invalid_exceeded);
        self.eval_fault(SafetyFault::SensorZero, zero_exceeded);
        let was_valid = self.temperature_valid;
        self.temperature_valid = !(invalid_exceeded || zero_exceeded);
        if was_valid && !self.temperature_valid {
            warn!(
                "Temperature invalid: {:.1}\u{00b0}C (invalid streak {}, zero streak {})",
                temp_c, self.invalid_streak, self.zero_streak
            );
        }
        self.temperature_valid
    }

    /// Evaluate the per-tick conditions.  `heater_on` is the relay level
    /// last applied; any drop ends the continuous heating period.
    /// `pid_output` is the latest controller fraction.  Returns the updated
    /// fault bitmask.
    pub fn evaluate(&mut self, temp_c: f32, heater_on: bool, pid_output: f32, now_ms: u64) -> u8 {
        let l = self.limits;

        // ── Over-temperature ─────────────────────────────────────
        self.eval_fault(SafetyFault::OverTemperature, temp_c >= l.max_safe_temp_c);
        let emergency_temp = temp_c >= l.emergency_temp_c;
        self.eval_fault(SafetyFault::EmergencyTemperature, emergency_temp);
        if emergency_temp {
            self.trigger_emergency(format_args!("Emergency temperature {temp_c:.1}C"), now_ms);
        }

        // ── Heating effectiveness ────────────────────────────────
        if heater_on && self.temperature_valid {
            self.track_heating(temp_c, now_ms);
        } else {
            self.heating_start_ms = None;
            self.ineffective_since_ms = None;
            self.heating_effective = true;
        }
        self.eval_fault(SafetyFault::HeatingIneffective, !self.heating_effective);

        // ── PID saturation ───────────────────────────────────────
        if pid_output >= l.saturation_output {
            let since = *self.saturated_since_ms.get_or_insert(now_ms);
            let saturated = now_ms.saturating_sub(since) >= l.max_saturation_ms;
            self.eval_fault(SafetyFault::PidSaturated, saturated);
        } else {
            self.saturated_since_ms = None;
            self.eval_fault(SafetyFault::PidSaturated, false);
        }

        // ── Escalation ───────────────────────────────────────────
        if self.safety_enabled && !self.heating_effective {
            let ineffective_for = self
                .ineffective_since_ms
                .map_or(0, |t| now_ms.saturating_sub(t));
            if ineffective_for >= l.max_heating_time_ms {
                self.trigger_emergency(
                    format_args!("Heating ineffective for {} s", ineffective_for / 1000),
                    now_ms,
                );
            } else if self.has_fault(SafetyFault::PidSaturated) {
                self.trigger_emergency(format_args!("PID saturated without temperature rise"), now_ms);
            }
        }

        self.eval_fault(SafetyFault::EmergencyShutdown, self.emergency);
        self.faults
    }

    /// Record how long the last control tick took.
    pub fn record_loop_time(&mut self, duration_us: u64) {
        self.max_loop_us = self.max_loop_us.max(duration_us);
        self.total_loop_us = self.total_loop_us.saturating_add(duration_us);
        self.loop_samples += 1;
        let overrun = duration_us > self.limits.critical_loop_us;
        if overrun && !self.has_fault(SafetyFault::LoopOverrun) {
            warn!("Control loop took {} us", duration_us);
        }
        self.eval_fault(SafetyFault::LoopOverrun, overrun);
    }

    /// Turn the safety system on or off.  Turning it off clears a latched
    /// emergency shutdown.
    pub fn set_safety_enabled(&mut self, enabled: bool) {
        if self.safety_enabled == enabled {
            return;
        }
        self.safety_enabled = enabled;
        if enabled {
            info!("Safety system enabled");
        } else {
            warn!("Safety system DISABLED by operator");
            if self.emergency {
                warn!("Emergency shutdown cleared: {}", self.shutdown_reason);
                self.emergency = false;
                self.shutdown_reason.clear();
                self.shutdown_time_ms = None;
                self.eval_fault(SafetyFault::EmergencyShutdown, false);
            }
        }
    }

    /// True when the heater may be driven.
    pub fn controller_enabled(&self) -> bool {
        if self.emergency {
            return false;
        }
        !self.safety_enabled || self.temperature_valid
    }

    pub fn emergency_shutdown(&self) -> bool {
        self.emergency
    }

    pub fn shutdown_reason(&self) -> &str {
        &self.shutdown_reason
    }

    pub fn temperature_valid(&self) -> bool {
        self.temperature_valid
    }

    pub fn safety_enabled(&self) -> bool {
        self.safety_enabled
    }

    pub fn faults(&self) -> u8 {
        self.faults
    }

    pub fn has_fault(&self, fault: SafetyFault) -> bool {
        self.faults & fault.mask() != 0
    }

    pub fn state(&self) -> SafetyState {
        SafetyState {
            temperature_valid: self.temperature_valid,
            invalid_temp_streak: self.invalid_streak,
            zero_temp_streak: self.zero_streak,
            heating_effective: self.heating_effective,
            heating_start_ms: self.heating_start_ms,
            heating_start_temp_c: self.heating_start_temp_c,
            ineffective_since_ms: self.ineffective_since_ms,
            pid_saturated_since_ms: self.saturated_since_ms,
            pid_saturated: self.has_fault(SafetyFault::PidSaturated),
            over_temp_warning: self.has_fault(SafetyFault::OverTemperature),
            emergency_shutdown: self.emergency,
            shutdown_reason: self.shutdown_reason.as_str().into(),
            shutdown_time_ms: self.shutdown_time_ms,
            safety_enabled: self.safety_enabled,
            fault_flags: self.faults,
            max_loop_us: self.max_loop_us,
            avg_loop_us: self.total_loop_us.checked_div(self.loop_samples).unwrap_or(0),
            loop_overrun: self.has_fault(SafetyFault::LoopOverrun),
        }
    }

    // ── Internal ──────────────────────────────────────────────────

    fn track_heating(&mut self, temp_c: f32, now_ms: u64) {
        if self.heating_start_ms.is_none() {
            self.heating_start_ms = Some(now_ms);
            self.heating_start_temp_c = temp_c;
            self.check_start_ms = now_ms;
            self.check_start_temp_c = temp_c;
            return;
        }
        if now_ms.saturating_sub(self.check_start_ms) < self.limits.heating_check_interval_ms {
            return;
        }
        let rise = temp_c - self.check_start_temp_c;
        let effective = rise >= self.limits.min_temp_rise_c;
        if self.heating_effective && !effective {
            warn!(
                "Heating ineffective: +{:.1}\u{00b0}C in {} s",
                rise,
                self.limits.heating_check_interval_ms / 1000
            );
        }
        self.heating_effective = effective;
        if effective {
            self.ineffective_since_ms = None;
        } else if self.ineffective_since_ms.is_none() {
            self.ineffective_since_ms = Some(now_ms);
        }
        self.check_start_ms = now_ms;
        self.check_start_temp_c = temp_c;
    }

    fn trigger_emergency(&mut self, reason: core::fmt::Arguments<'_>, now_ms: u64) {
        if self.emergency {
            return;
        }
        self.emergency = true;
        self.shutdown_time_ms = Some(now_ms);
        self.shutdown_reason.clear();
        // Truncated reasons are acceptable.
        let _ = self.shutdown_reason.write_fmt(reason);
        error!("EMERGENCY SHUTDOWN: {}", self.shutdown_reason);
    }

    /// Set or clear a fault bit based on a boolean condition.
    fn eval_fault(&mut self, fault: SafetyFault, condition: bool) {
        if condition {
            if self.faults & fault.mask() == 0 {
                error!("SAFETY FAULT SET: {fault}");
            }
            self.faults |= fault.mask();
        } else {
            if self.faults & fault.mask() != 0 {
                info!("SAFETY FAULT CLEARED: {fault}");
            }
            self.faults &= !fault.mask();
        }
    }
}
