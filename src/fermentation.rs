//! Fermentation-adjusted stage timing (Q10 model).
//!
//! Yeast activity roughly doubles for every 10 °C of warmth.  The factor
//!
//! ```text
//!   factor = Q10 ^ ((baseline - measured) / 10)
//! ```
//!
//! scales how much wall-clock time a fermentation stage needs: above 1 the
//! dough is cold and the stage stretches, below 1 it is warm and the stage
//! shortens.  Progress therefore accrues at `1 / factor` biological seconds
//! per wall-clock second, and a stage completes once progress reaches its
//! planned duration.

use chrono::{NaiveDateTime, TimeDelta};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::program::Program;

pub const MIN_FACTOR: f32 = 0.1;
pub const MAX_FACTOR: f32 = 20.0;

/// Q10 time factor for `measured_c`, clamped to `[MIN_FACTOR, MAX_FACTOR]`.
pub fn fermentation_factor(baseline_c: f32, q10: f32, measured_c: f32) -> f32 {
    let factor = q10.powf((baseline_c - measured_c) / 10.0);
    if factor.is_nan() {
        return 1.0;
    }
    factor.clamp(MIN_FACTOR, MAX_FACTOR)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FermentationState {
    pub active: bool,
    pub initial_temp_c: f32,
    pub current_factor: f32,
    pub last_observed_temp_c: f32,
    pub last_update_ms: Option<u64>,
    /// Biological seconds accumulated in the current stage.
    pub weighted_elapsed_secs: f64,
}

impl Default for FermentationState {
    fn default() -> Self {
        Self {
            active: false,
            initial_temp_c: 0.0,
            current_factor: 1.0,
            last_observed_temp_c: 0.0,
            last_update_ms: None,
            weighted_elapsed_secs: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FermentationTracker {
    state: FermentationState,
    baseline_c: f32,
    q10: f32,
}

impl FermentationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the tracker on entry to a fermentation stage.
    pub fn begin(&mut self, baseline_c: f32, q10: f32, temp_c: f32, now_ms: u64) {
        self.baseline_c = baseline_c;
        self.q10 = q10;
        let factor = fermentation_factor(baseline_c, q10, temp_c);
        self.state = FermentationState {
            active: true,
            initial_temp_c: temp_c,
            current_factor: factor,
            last_observed_temp_c: temp_c,
            last_update_ms: Some(now_ms),
            weighted_elapsed_secs: 0.0,
        };
        debug!("Fermentation: start at {temp_c:.1}\u{00b0}C, factor {factor:.2}");
    }

    /// Accumulate progress since the last update using the factor in force
    /// over that interval, then refresh the factor from `temp_c`.
    pub fn update(&mut self, temp_c: f32, now_ms: u64) -> f64 {
        if !self.state.active {
            return 0.0;
        }
        let last = self.state.last_update_ms.unwrap_or(now_ms);
        let real_secs = now_ms.saturating_sub(last) as f64 / 1000.0;
        self.state.weighted_elapsed_secs += real_secs / f64::from(self.state.current_factor);
        self.state.current_factor = fermentation_factor(self.baseline_c, self.q10, temp_c);
        self.state.last_observed_temp_c = temp_c;
        self.state.last_update_ms = Some(now_ms);
        self.state.weighted_elapsed_secs
    }

    /// Skip the interval since the last update (used after a pause).
    pub fn skip_to(&mut self, now_ms: u64) {
        if self.state.active {
            self.state.last_update_ms = Some(now_ms);
        }
    }

    /// Adopt previously accumulated progress (resume after power loss).
    pub fn restore_progress(&mut self, weighted_elapsed_secs: f64) {
        if self.state.active {
            self.state.weighted_elapsed_secs = weighted_elapsed_secs.max(0.0);
        }
    }

    pub fn clear(&mut self) {
        self.state = FermentationState::default();
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn factor(&self) -> f32 {
        if self.state.active {
            self.state.current_factor
        } else {
            1.0
        }
    }

    pub fn weighted_elapsed_secs(&self) -> f64 {
        self.state.weighted_elapsed_secs
    }

    pub fn is_complete(&self, planned_secs: u64) -> bool {
        self.state.weighted_elapsed_secs >= planned_secs as f64
    }

    /// Wall-clock seconds still needed at the current factor.
    pub fn remaining_wall_secs(&self, planned_secs: u64) -> f64 {
        let left = (planned_secs as f64 - self.state.weighted_elapsed_secs).max(0.0);
        left * f64::from(self.factor())
    }

    pub fn state(&self) -> &FermentationState {
        &self.state
    }
}

// ---------------------------------------------------------------------------
// Schedule forecast
// ---------------------------------------------------------------------------

/// Predicted end times for the active program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub stage_ends: Vec<NaiveDateTime>,
    pub program_end: NaiveDateTime,
    /// Planned wall-clock seconds left in the current stage.
    pub time_left_secs: u64,
    /// Fermentation-adjusted seconds left in the current stage.
    pub adjusted_time_left_secs: u64,
}

/// Inputs describing where the run currently is.
pub struct RunPosition<'a> {
    pub stage_index: usize,
    pub stage_elapsed_ms: u64,
    pub actual_stage_ends: &'a [Option<NaiveDateTime>],
    pub actual_stage_starts: &'a [Option<NaiveDateTime>],
    pub current_temp_c: f32,
}

fn after(t: NaiveDateTime, secs: f64) -> NaiveDateTime {
    let delta = TimeDelta::milliseconds((secs * 1000.0) as i64);
    t.checked_add_signed(delta).unwrap_or(t)
}

/// Forecast stage and program end times.  Completed stages use recorded
/// timestamps, the current stage its remaining (adjusted) time, and later
/// stages their planned duration stretched by the current factor when they
/// ferment.
pub fn forecast(
    program: &Program,
    pos: &RunPosition<'_>,
    tracker: &FermentationTracker,
    now: NaiveDateTime,
) -> Option<Forecast> {
    let current = program.stage(pos.stage_index)?;
    let planned = current.planned_secs();
    let time_left = planned.saturating_sub(pos.stage_elapsed_ms / 1000);
    let adjusted_left = if current.is_fermentation && tracker.is_active() {
        tracker.remaining_wall_secs(planned)
    } else {
        time_left as f64
    };
    let factor = if tracker.is_active() {
        tracker.factor()
    } else {
        fermentation_factor(program.baseline_c(), program.q10(), pos.current_temp_c)
    };

    let mut stage_ends = Vec::with_capacity(program.stages.len());
    for i in 0..pos.stage_index {
        let recorded = pos
            .actual_stage_ends
            .get(i)
            .copied()
            .flatten()
            .or_else(|| pos.actual_stage_starts.get(i + 1).copied().flatten());
        stage_ends.push(recorded.unwrap_or(now));
    }

    let mut cursor = after(now, adjusted_left);
    stage_ends.push(cursor);
    for stage in &program.stages[pos.stage_index + 1..] {
        let secs = stage.planned_secs() as f64;
        let secs = if stage.is_fermentation { secs * f64::from(factor) } else { secs };
        cursor = after(cursor, secs);
        stage_ends.push(cursor);
    }

    Some(Forecast {
        program_end: cursor,
        stage_ends,
        time_left_secs: time_left,
        adjusted_time_left_secs: adjusted_left.ceil() as u64,
    })
}
