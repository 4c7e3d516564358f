//! Program and stage definitions.
//!
//! Programs are owned by the program store; the core checks out at most one
//! at a time and only mutates it through the stage-duration override.

use serde::{Deserialize, Serialize};

/// Default fermentation baseline when a program leaves it unset.
pub const DEFAULT_FERMENT_BASELINE_C: f32 = 20.0;
/// Default Q10 coefficient when a program leaves it unset.
pub const DEFAULT_FERMENT_Q10: f32 = 2.0;

/// One step of a stage's mixing pattern: run the motor for `mix_secs`, then
/// rest for `wait_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixStep {
    pub mix_secs: u32,
    pub wait_secs: u32,
}

impl MixStep {
    pub fn period_ms(&self) -> u64 {
        (u64::from(self.mix_secs) + u64::from(self.wait_secs)) * 1000
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub label: String,
    pub duration_minutes: u32,
    /// Heater target. `0` means unheated.
    pub target_temp_c: f32,
    #[serde(default)]
    pub mix_pattern: Vec<MixStep>,
    #[serde(default)]
    pub no_mix: bool,
    #[serde(default)]
    pub is_fermentation: bool,
    /// Free-text instructions shown to the operator.
    #[serde(default)]
    pub instructions: String,
}

impl Stage {
    pub fn planned_secs(&self) -> u64 {
        u64::from(self.duration_minutes) * 60
    }

    /// True when the motor must stay off for the whole stage.
    pub fn is_rest(&self) -> bool {
        self.no_mix || self.mix_pattern.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_baseline")]
    pub ferment_baseline_temp_c: f32,
    #[serde(default = "default_q10")]
    pub ferment_q10: f32,
    pub stages: Vec<Stage>,
}

fn default_baseline() -> f32 {
    DEFAULT_FERMENT_BASELINE_C
}

fn default_q10() -> f32 {
    DEFAULT_FERMENT_Q10
}

impl Program {
    /// Baseline temperature, falling back to the default for non-positive values.
    pub fn baseline_c(&self) -> f32 {
        if self.ferment_baseline_temp_c > 0.0 {
            self.ferment_baseline_temp_c
        } else {
            DEFAULT_FERMENT_BASELINE_C
        }
    }

    /// Q10 coefficient, falling back to the default for non-positive values.
    pub fn q10(&self) -> f32 {
        if self.ferment_q10 > 0.0 {
            self.ferment_q10
        } else {
            DEFAULT_FERMENT_Q10
        }
    }

    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    pub fn metadata(&self) -> ProgramMetadata {
        ProgramMetadata {
            id: self.id,
            name: self.name.clone(),
            stage_count: self.stages.len(),
        }
    }
}

/// Lightweight listing entry returned by the program store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramMetadata {
    pub id: u32,
    pub name: String,
    pub stage_count: usize,
}
