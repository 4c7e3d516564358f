//! Temperature-banded PID gain profiles.
//!
//! Each profile covers the half-open band `[min_temp, max_temp)` of the
//! *measured* temperature.  With auto-switching on, the scheduler re-checks
//! the band at a fixed interval and hands back the profile to adopt when the
//! band changes.

use log::info;
use serde::{Deserialize, Serialize};

use super::pid::PidGains;
use crate::error::ConfigFault;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidProfile {
    pub name: String,
    pub min_temp_c: f32,
    pub max_temp_c: f32,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    #[serde(default)]
    pub description: String,
}

impl PidProfile {
    pub fn contains(&self, temp_c: f32) -> bool {
        temp_c >= self.min_temp_c && temp_c < self.max_temp_c
    }

    pub fn gains(&self) -> PidGains {
        PidGains {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
        }
    }
}

/// Factory profiles covering proofing through baking.
pub fn default_profiles() -> Vec<PidProfile> {
    let band = |name: &str, min, max, kp, ki, kd, description: &str| PidProfile {
        name: name.into(),
        min_temp_c: min,
        max_temp_c: max,
        kp,
        ki,
        kd,
        description: description.into(),
    };
    vec![
        band("Proofing", -10.0, 35.0, 0.15, 0.002, 2.0, "Gentle hold for fermentation"),
        band("Warm", 35.0, 60.0, 0.10, 0.001, 3.0, "Dough warming and melting"),
        band("Baking", 60.0, 250.0, 0.05, 0.0005, 5.0, "High-heat bake"),
    ]
}

pub struct GainScheduler {
    profiles: Vec<PidProfile>,
    active: Option<usize>,
    auto_switching: bool,
    check_interval_ms: u32,
    last_check_ms: Option<u64>,
}

impl GainScheduler {
    pub fn new(profiles: Vec<PidProfile>, auto_switching: bool, check_interval_ms: u32) -> Self {
        Self {
            profiles,
            active: None,
            auto_switching,
            check_interval_ms,
            last_check_ms: None,
        }
    }

    pub fn profiles(&self) -> &[PidProfile] {
        &self.profiles
    }

    pub fn active(&self) -> Option<&PidProfile> {
        self.active.and_then(|i| self.profiles.get(i))
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active().map(|p| p.name.as_str())
    }

    pub fn auto_switching(&self) -> bool {
        self.auto_switching
    }

    pub fn set_auto_switching(&mut self, enabled: bool) {
        if self.auto_switching != enabled {
            info!("Gain scheduler: auto-switching {}", if enabled { "on" } else { "off" });
        }
        self.auto_switching = enabled;
        self.last_check_ms = None;
    }

    /// Index of the profile whose band contains `temp_c`.
    pub fn profile_for(&self, temp_c: f32) -> Option<usize> {
        self.profiles.iter().position(|p| p.contains(temp_c))
    }

    /// Activate a profile by name.
    pub fn switch_to(&mut self, name: &str) -> Result<&PidProfile, ConfigFault> {
        let idx = self
            .profiles
            .iter()
            .position(|p| p.name == name)
            .ok_or(ConfigFault::UnknownProfile)?;
        self.activate(idx);
        Ok(&self.profiles[idx])
    }

    /// Rate-limited band check.  Returns the newly activated profile when a
    /// switch happened.
    pub fn check(&mut self, now_ms: u64, measured_c: f32) -> Option<&PidProfile> {
        if !self.auto_switching || measured_c <= 0.0 {
            return None;
        }
        let interval = u64::from(self.check_interval_ms);
        if self
            .last_check_ms
            .is_some_and(|last| now_ms.saturating_sub(last) < interval)
        {
            return None;
        }
        self.last_check_ms = Some(now_ms);

        let idx = self.profile_for(measured_c)?;
        if self.active == Some(idx) {
            return None;
        }
        self.activate(idx);
        info!(
            "Gain scheduler: {:.1}\u{00b0}C -> profile '{}'",
            measured_c, self.profiles[idx].name
        );
        self.profiles.get(idx)
    }

    fn activate(&mut self, idx: usize) {
        self.active = Some(idx);
    }
}
