//! Heater control: PID, gain profiles, and the time-proportional window.
//!
//! ```text
//!   setpoint ─┐
//!             ▼
//!   measured ─▶ PidController ──output∈[0,1]──▶ TimeProportionalWindow ──▶ heater
//!        │          ▲
//!        └──▶ GainScheduler (band check every few seconds)
//! ```

pub mod pid;
pub mod profiles;
pub mod window;

use serde::Serialize;

use crate::config::SystemConfig;
use crate::error::ConfigFault;
use pid::{PidController, PidGains};
use profiles::{GainScheduler, PidProfile};
use window::{TimeProportionalWindow, WindowSettings};

/// Read-only view of the controller for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerState {
    pub setpoint: f32,
    pub measured_input: f32,
    pub output: f32,
    pub heater_on: bool,
    pub window_ms: u32,
    pub window_start_ms: Option<u64>,
    pub on_time_ms: u32,
    pub last_output_for_restart: f32,
    pub dynamic_restart_count: u32,
    pub last_restart_reason: String,
    pub active_profile_name: Option<String>,
    pub auto_switching: bool,
    pub gains: PidGains,
}

/// Result of one controller step.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlStep {
    pub heater_on: bool,
    /// Name of the profile adopted by auto-switching during this step.
    pub switched_profile: Option<String>,
}

pub struct HeaterController {
    pid: PidController,
    scheduler: GainScheduler,
    window: TimeProportionalWindow,
    sample_period_ms: u32,
    last_compute_ms: Option<u64>,
    measured_input: f32,
    output: f32,
    enabled: bool,
}

impl HeaterController {
    pub fn new(config: &SystemConfig) -> Self {
        let mut pid = PidController::new(config.kp, config.ki, config.kd, 0.0);
        pid.set_limits(0.0, 1.0);
        let mut scheduler = GainScheduler::new(
            config.pid_profiles.clone(),
            config.auto_switching,
            config.profile_check_interval_ms,
        );
        if let Some(name) = config.active_profile.as_deref() {
            if let Ok(profile) = scheduler.switch_to(name) {
                pid.set_gains(profile.gains());
            }
        }
        Self {
            pid,
            scheduler,
            window: TimeProportionalWindow::new(config.window),
            sample_period_ms: config.pid_sample_ms,
            last_compute_ms: None,
            measured_input: 0.0,
            output: 0.0,
            enabled: false,
        }
    }

    /// Run one controller step at `now_ms`.
    ///
    /// With `enabled == false` or a non-positive setpoint the heater is
    /// forced off, the PID is reset, and the window is left alone.
    pub fn update(&mut self, now_ms: u64, setpoint: f32, measured: f32, enabled: bool) -> ControlStep {
        self.measured_input = measured;
        self.pid.set_target(setpoint);

        if !enabled || setpoint <= 0.0 {
            if self.enabled {
                self.pid.reset();
                self.last_compute_ms = None;
            }
            self.enabled = false;
            self.output = 0.0;
            self.window.update(now_ms, 0.0, false);
            return ControlStep {
                heater_on: false,
                switched_profile: None,
            };
        }
        self.enabled = true;

        let switched_profile = self.scheduler.check(now_ms, measured).map(|p| {
            self.pid.set_gains(p.gains());
            p.name.clone()
        });

        let period = u64::from(self.sample_period_ms);
        let due = self
            .last_compute_ms
            .is_none_or(|last| now_ms.saturating_sub(last) >= period);
        if due {
            let dt_ms = self
                .last_compute_ms
                .map_or(period, |last| now_ms.saturating_sub(last));
            self.output = self.pid.compute(measured, dt_ms as f32 / 1000.0);
            self.last_compute_ms = Some(now_ms);
        }

        ControlStep {
            heater_on: self.window.update(now_ms, self.output, true),
            switched_profile,
        }
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.pid.set_gains(gains);
    }

    pub fn switch_profile(&mut self, name: &str) -> Result<(), ConfigFault> {
        let gains = self.scheduler.switch_to(name)?.gains();
        self.pid.set_gains(gains);
        Ok(())
    }

    pub fn set_auto_switching(&mut self, enabled: bool) {
        self.scheduler.set_auto_switching(enabled);
    }

    pub fn set_window(&mut self, settings: WindowSettings) {
        self.window.set_settings(settings);
    }

    pub fn set_sample_period(&mut self, ms: u32) {
        self.sample_period_ms = ms;
    }

    pub fn gains(&self) -> PidGains {
        self.pid.gains()
    }

    pub fn profiles(&self) -> &[PidProfile] {
        self.scheduler.profiles()
    }

    pub fn active_profile_name(&self) -> Option<&str> {
        self.scheduler.active_name()
    }

    pub fn auto_switching(&self) -> bool {
        self.scheduler.auto_switching()
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn heater_on(&self) -> bool {
        self.window.heater_on()
    }

    pub fn state(&self) -> ControllerState {
        ControllerState {
            setpoint: self.pid.target(),
            measured_input: self.measured_input,
            output: self.output,
            heater_on: self.window.heater_on(),
            window_ms: self.window.settings().window_ms,
            window_start_ms: self.window.window_start_ms(),
            on_time_ms: self.window.on_time_ms(),
            last_output_for_restart: self.window.last_output_for_restart(),
            dynamic_restart_count: self.window.restart_count(),
            last_restart_reason: self.window.last_restart_reason().into(),
            active_profile_name: self.scheduler.active_name().map(Into::into),
            auto_switching: self.scheduler.auto_switching(),
            gains: self.pid.gains(),
        }
    }
}
