//! Shared mutable context threaded through every FSM handler.
//!
//! `RunContext` is the blackboard the state handlers and the command path
//! both work on: the persisted [`RunState`], the checked-out program, the
//! fermentation tracker, the latest filtered temperature, and the outputs
//! the stage logic asks for (setpoint, motor demand, buzzer pulse).
//!
//! Stage timers are split into an accumulated base plus the start of the
//! current running segment, so paused time never counts:
//!
//! ```text
//!   elapsed = base + (now - segment_start)     while running
//!   elapsed = base                             while paused
//! ```

use chrono::NaiveDateTime;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::events::CoreEvent;
use crate::config::SystemConfig;
use crate::error::{ConfigFault, Error, ProgramFault};
use crate::fermentation::FermentationTracker;
use crate::program::{Program, Stage};
use crate::scheduler::ScheduledStart;

/// Minimum spacing between fermentation progress events.
const FERMENT_EVENT_INTERVAL_MS: u64 = 60_000;

// ---------------------------------------------------------------------------
// Run state (persisted)
// ---------------------------------------------------------------------------

/// Position and timing of the active program run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub active_program_id: Option<u32>,
    pub stage_index: usize,
    pub mix_index: usize,
    /// Monotonic start of the current running segment of the stage.
    pub stage_start_ms: u64,
    /// Stage time accumulated before `stage_start_ms`.
    pub stage_elapsed_base_ms: u64,
    pub mix_step_start_ms: u64,
    pub mix_elapsed_base_ms: u64,
    pub program_start_time: Option<NaiveDateTime>,
    pub is_running: bool,
    pub manual_mode: bool,
    pub scheduled_start: Option<ScheduledStart>,
    pub actual_stage_start: Vec<Option<NaiveDateTime>>,
    pub actual_stage_end: Vec<Option<NaiveDateTime>>,
    pub paused_at_ms: Option<u64>,
    /// Completed passes through the current stage's mix pattern.
    pub mix_cycles: u32,
}

/// What to persist so a run survives a power cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeSnapshot {
    pub program_id: u32,
    pub stage_index: usize,
    pub mix_index: usize,
    pub is_running: bool,
    pub program_start_time: Option<NaiveDateTime>,
    pub actual_stage_start: Vec<Option<NaiveDateTime>>,
    pub actual_stage_end: Vec<Option<NaiveDateTime>>,
    pub stage_elapsed_ms: u64,
    pub fermentation_weighted_secs: f64,
}

/// Outcome of moving past the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAdvance {
    /// Now in the given stage.
    Next(usize),
    /// The last stage finished; the caller stops the run.
    Completed,
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

pub struct RunContext {
    pub run: RunState,
    pub program: Option<Program>,
    pub ferment: FermentationTracker,

    // -- Inputs, refreshed every tick --
    /// Latest filtered temperature (°C).
    pub temperature_c: f32,
    /// Time left before the boot hold allows a run to begin.
    pub start_hold_remaining_ms: u64,

    // -- Stage-driven outputs --
    /// Heater target requested by the active stage; 0 means no heat.
    pub setpoint_c: f32,
    /// Motor requested by the mix pattern.
    pub motor_demand: bool,
    pub buzzer_until_ms: Option<u64>,

    /// Set on every change that should reach the resume store.
    pub run_dirty: bool,

    now_ms: u64,
    wall_now: NaiveDateTime,
    buzzer_pulse_ms: u32,
    last_ferment_event_ms: Option<u64>,
    events: Vec<CoreEvent>,
}

impl RunContext {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            run: RunState::default(),
            program: None,
            ferment: FermentationTracker::new(),
            temperature_c: 0.0,
            start_hold_remaining_ms: 0,
            setpoint_c: 0.0,
            motor_demand: false,
            buzzer_until_ms: None,
            run_dirty: false,
            now_ms: 0,
            wall_now: NaiveDateTime::default(),
            buzzer_pulse_ms: config.buzzer_pulse_ms,
            last_ferment_event_ms: None,
            events: Vec::new(),
        }
    }

    // ── Clock and events ──────────────────────────────────────

    pub fn set_clock(&mut self, now_ms: u64, wall_now: NaiveDateTime) {
        self.now_ms = now_ms;
        self.wall_now = wall_now;
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn wall_now(&self) -> NaiveDateTime {
        self.wall_now
    }

    pub fn set_buzzer_pulse(&mut self, ms: u32) {
        self.buzzer_pulse_ms = ms;
    }

    pub fn push_event(&mut self, event: CoreEvent) {
        self.events.push(event);
    }

    /// Hand pending events to the caller in emission order.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, CoreEvent> {
        self.events.drain(..)
    }

    /// Start a buzzer pulse.
    pub fn beep(&mut self) {
        self.buzzer_until_ms = Some(self.now_ms + u64::from(self.buzzer_pulse_ms));
    }

    pub fn buzzer_active(&self) -> bool {
        self.buzzer_until_ms.is_some_and(|until| self.now_ms < until)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn current_stage(&self) -> Option<&Stage> {
        self.program.as_ref()?.stage(self.run.stage_index)
    }

    fn is_paused(&self) -> bool {
        self.run.paused_at_ms.is_some()
    }

    /// Stage time excluding pauses.
    pub fn stage_elapsed_ms(&self) -> u64 {
        if self.is_paused() {
            self.run.stage_elapsed_base_ms
        } else {
            self.run.stage_elapsed_base_ms + self.now_ms.saturating_sub(self.run.stage_start_ms)
        }
    }

    pub fn mix_elapsed_ms(&self) -> u64 {
        if self.is_paused() {
            self.run.mix_elapsed_base_ms
        } else {
            self.run.mix_elapsed_base_ms + self.now_ms.saturating_sub(self.run.mix_step_start_ms)
        }
    }

    // ── Program selection ─────────────────────────────────────

    /// Check `program` out as the active program.  Run position is reset;
    /// manual mode survives.
    pub fn select_program(&mut self, program: Program) {
        let stages = program.stages.len();
        self.run = RunState {
            active_program_id: Some(program.id),
            manual_mode: self.run.manual_mode,
            actual_stage_start: vec![None; stages],
            actual_stage_end: vec![None; stages],
            ..RunState::default()
        };
        self.ferment.clear();
        self.setpoint_c = 0.0;
        self.motor_demand = false;
        self.push_event(CoreEvent::ProgramSelected {
            program_id: program.id,
            name: program.name.clone(),
        });
        info!("Program selected: {} ({} stages)", program.name, stages);
        self.program = Some(program);
        self.run_dirty = true;
    }

    // ── Stage operations ──────────────────────────────────────

    /// Prepare a run starting at `stage_index`.  The caller moves the FSM
    /// to Running afterwards.
    pub fn begin_run(&mut self, stage_index: usize) -> Result<(), Error> {
        let program = self.program.as_ref().ok_or(ProgramFault::NoProgramSelected)?;
        if program.stages.is_empty() {
            return Err(ProgramFault::NoStages.into());
        }
        let stage_count = program.stages.len();
        if stage_index >= stage_count {
            return Err(ConfigFault::InvalidStageIndex {
                index: stage_index,
                stage_count,
            }
            .into());
        }
        let (id, name) = (program.id, program.name.clone());

        self.run.program_start_time = Some(self.wall_now);
        self.run.actual_stage_start = vec![None; stage_count];
        self.run.actual_stage_end = vec![None; stage_count];
        self.run.scheduled_start = None;
        self.run.paused_at_ms = None;
        self.push_event(CoreEvent::ProgramStarted {
            program_id: id,
            name,
            stage_index,
        });
        self.enter_stage(stage_index);
        Ok(())
    }

    /// Close the current stage and move to the next one.
    pub fn advance(&mut self) -> Result<StageAdvance, ProgramFault> {
        let stage_count = self
            .program
            .as_ref()
            .ok_or(ProgramFault::NoProgramSelected)?
            .stages
            .len();
        let index = self.run.stage_index;
        if index >= stage_count {
            return Err(ProgramFault::NoStages);
        }
        self.close_stage(index);
        if index + 1 >= stage_count {
            return Ok(StageAdvance::Completed);
        }
        self.enter_stage(index + 1);
        Ok(StageAdvance::Next(index + 1))
    }

    /// Step back one stage, staying on the first stage when already there.
    pub fn back(&mut self) -> Result<usize, ProgramFault> {
        let stage_count = self
            .program
            .as_ref()
            .ok_or(ProgramFault::NoProgramSelected)?
            .stages
            .len();
        if stage_count == 0 {
            return Err(ProgramFault::NoStages);
        }
        let target = self.run.stage_index.saturating_sub(1).min(stage_count - 1);
        self.enter_stage(target);
        Ok(target)
    }

    /// Replace the active stage's duration for this run only.
    pub fn override_duration(&mut self, minutes: u32) -> Result<(), Error> {
        if minutes == 0 {
            return Err(ConfigFault::InvalidDuration.into());
        }
        let index = self.run.stage_index;
        let program = self.program.as_mut().ok_or(ProgramFault::NoProgramSelected)?;
        let stage_count = program.stages.len();
        let stage = program
            .stages
            .get_mut(index)
            .ok_or(ConfigFault::InvalidStageIndex { index, stage_count })?;
        info!(
            "Stage {} '{}' duration {} -> {} min",
            index, stage.label, stage.duration_minutes, minutes
        );
        stage.duration_minutes = minutes;
        self.reset_stage_timer();
        self.begin_fermentation_if_needed();
        self.run_dirty = true;
        Ok(())
    }

    /// Stop semantics: back to the first stage with nothing running.
    /// Recorded timestamps are kept for display until the next start.
    pub fn reset_run(&mut self) {
        self.run.stage_index = 0;
        self.run.mix_index = 0;
        self.run.mix_cycles = 0;
        self.run.is_running = false;
        self.run.paused_at_ms = None;
        self.run.scheduled_start = None;
        self.run.stage_elapsed_base_ms = 0;
        self.run.mix_elapsed_base_ms = 0;
        self.ferment.clear();
        self.setpoint_c = 0.0;
        self.motor_demand = false;
        self.run_dirty = true;
    }

    /// Freeze stage and mix timers.
    pub fn freeze_timers(&mut self) {
        if self.is_paused() {
            return;
        }
        self.run.stage_elapsed_base_ms = self.stage_elapsed_ms();
        self.run.mix_elapsed_base_ms = self.mix_elapsed_ms();
        self.run.paused_at_ms = Some(self.now_ms);
    }

    /// Restart frozen timers from now.  Returns the paused duration.
    pub fn thaw_timers(&mut self) -> u64 {
        let Some(paused_at) = self.run.paused_at_ms.take() else {
            return 0;
        };
        self.run.stage_start_ms = self.now_ms;
        self.run.mix_step_start_ms = self.now_ms;
        self.ferment.skip_to(self.now_ms);
        self.now_ms.saturating_sub(paused_at)
    }

    /// Record the first entry into the current stage.
    pub fn mark_stage_started(&mut self) {
        let now = self.wall_now;
        if let Some(slot) = self.run.actual_stage_start.get_mut(self.run.stage_index) {
            if slot.is_none() {
                *slot = Some(now);
            }
        }
    }

    /// Point the heater at the current stage's target.
    pub fn apply_stage_setpoint(&mut self) {
        self.setpoint_c = self.current_stage().map_or(0.0, |s| s.target_temp_c.max(0.0));
    }

    // ── Per-tick stage progress (Running only) ───────────────

    /// Accumulate fermentation progress and report whether the stage is done.
    pub fn stage_complete(&mut self) -> bool {
        let Some((planned, fermenting)) = self
            .current_stage()
            .map(|s| (s.planned_secs(), s.is_fermentation))
        else {
            return false;
        };
        if fermenting && self.ferment.is_active() {
            let weighted = self.ferment.update(self.temperature_c, self.now_ms);
            let due = self
                .last_ferment_event_ms
                .is_none_or(|last| self.now_ms.saturating_sub(last) >= FERMENT_EVENT_INTERVAL_MS);
            if due {
                self.last_ferment_event_ms = Some(self.now_ms);
                self.push_event(CoreEvent::FermentationProgress {
                    stage_index: self.run.stage_index,
                    temp_c: self.temperature_c,
                    factor: self.ferment.factor(),
                    weighted_elapsed_secs: weighted,
                    planned_secs: planned,
                });
            }
            self.ferment.is_complete(planned)
        } else {
            self.stage_elapsed_ms() >= planned * 1000
        }
    }

    /// Step the mix sub-timer and set `motor_demand`.
    pub fn update_mix(&mut self) {
        let Some(stage) = self.current_stage() else {
            self.motor_demand = false;
            return;
        };
        if stage.is_rest() {
            self.motor_demand = false;
            return;
        }
        let pattern_len = stage.mix_pattern.len();
        let index = self.run.mix_index.min(pattern_len - 1);
        let step = stage.mix_pattern[index];
        let elapsed = self.mix_elapsed_ms();

        if elapsed >= step.period_ms() {
            let next = (index + 1) % pattern_len;
            let stage_index = self.run.stage_index;
            self.run.mix_index = next;
            self.run.mix_step_start_ms = self.now_ms;
            self.run.mix_elapsed_base_ms = 0;
            if next == 0 {
                self.run.mix_cycles = self.run.mix_cycles.saturating_add(1);
                let cycles = self.run.mix_cycles;
                self.push_event(CoreEvent::MixCycleCompleted { stage_index, cycles });
            } else {
                self.push_event(CoreEvent::MixStepAdvanced {
                    stage_index,
                    mix_index: next,
                });
            }
            let step = self.current_stage().map(|s| s.mix_pattern[next]);
            self.motor_demand = step.is_some_and(|s| s.mix_secs > 0);
        } else {
            self.motor_demand = elapsed < u64::from(step.mix_secs) * 1000;
        }
    }

    // ── Resume snapshot ───────────────────────────────────────

    pub fn resume_snapshot(&self) -> Option<ResumeSnapshot> {
        let program_id = self.run.active_program_id?;
        if !self.run.is_running && !self.is_paused() {
            return None;
        }
        Some(ResumeSnapshot {
            program_id,
            stage_index: self.run.stage_index,
            mix_index: self.run.mix_index,
            is_running: self.run.is_running,
            program_start_time: self.run.program_start_time,
            actual_stage_start: self.run.actual_stage_start.clone(),
            actual_stage_end: self.run.actual_stage_end.clone(),
            stage_elapsed_ms: self.stage_elapsed_ms(),
            fermentation_weighted_secs: self.ferment.weighted_elapsed_secs(),
        })
    }

    /// Validate `snapshot` against `program` and adopt it with timers
    /// frozen.  Returns whether the run was running when captured; the
    /// caller moves the FSM to Running or Paused.
    pub fn restore(&mut self, snapshot: &ResumeSnapshot, program: Program) -> Result<bool, Error> {
        if program.id != snapshot.program_id {
            return Err(ProgramFault::SnapshotMismatch.into());
        }
        let stage_count = program.stages.len();
        if stage_count == 0 {
            return Err(ProgramFault::NoStages.into());
        }
        if snapshot.stage_index >= stage_count {
            return Err(ConfigFault::InvalidStageIndex {
                index: snapshot.stage_index,
                stage_count,
            }
            .into());
        }
        if snapshot.actual_stage_start.len() != stage_count
            || snapshot.actual_stage_end.len() != stage_count
        {
            return Err(ProgramFault::SnapshotMismatch.into());
        }
        let mix_len = program.stages[snapshot.stage_index].mix_pattern.len();

        self.select_program(program);
        // Selection queued a ProgramSelected event; a restore is not a selection.
        self.events.pop();
        self.run.stage_index = snapshot.stage_index;
        self.run.mix_index = if snapshot.mix_index < mix_len { snapshot.mix_index } else { 0 };
        self.run.program_start_time = snapshot.program_start_time;
        self.run.actual_stage_start.clone_from(&snapshot.actual_stage_start);
        self.run.actual_stage_end.clone_from(&snapshot.actual_stage_end);
        self.run.stage_start_ms = self.now_ms;
        self.run.mix_step_start_ms = self.now_ms;
        self.run.stage_elapsed_base_ms = snapshot.stage_elapsed_ms;
        self.run.paused_at_ms = Some(self.now_ms);
        self.begin_fermentation_if_needed();
        self.ferment.restore_progress(snapshot.fermentation_weighted_secs);
        info!(
            "Restored run: program {} stage {} ({} s in, {})",
            snapshot.program_id,
            snapshot.stage_index,
            snapshot.stage_elapsed_ms / 1000,
            if snapshot.is_running { "running" } else { "paused" }
        );
        Ok(snapshot.is_running)
    }

    // ── Internal ──────────────────────────────────────────────

    fn reset_stage_timer(&mut self) {
        self.run.stage_start_ms = self.now_ms;
        self.run.stage_elapsed_base_ms = 0;
        self.run.mix_index = 0;
        self.run.mix_step_start_ms = self.now_ms;
        self.run.mix_elapsed_base_ms = 0;
        self.run.mix_cycles = 0;
        if self.is_paused() {
            self.run.paused_at_ms = Some(self.now_ms);
        }
    }

    fn begin_fermentation_if_needed(&mut self) {
        let Some(program) = self.program.as_ref() else {
            self.ferment.clear();
            return;
        };
        let fermenting = program
            .stage(self.run.stage_index)
            .is_some_and(|s| s.is_fermentation);
        if fermenting {
            let (baseline, q10) = (program.baseline_c(), program.q10());
            self.ferment.begin(baseline, q10, self.temperature_c, self.now_ms);
            self.last_ferment_event_ms = None;
        } else {
            self.ferment.clear();
        }
    }

    fn enter_stage(&mut self, index: usize) {
        self.run.stage_index = index;
        self.reset_stage_timer();
        if let Some(slot) = self.run.actual_stage_start.get_mut(index) {
            *slot = Some(self.wall_now);
        }
        self.begin_fermentation_if_needed();
        self.apply_stage_setpoint();
        self.motor_demand = false;
        if let Some(stage) = self.current_stage() {
            let event = CoreEvent::StageStarted {
                stage_index: index,
                label: stage.label.clone(),
                target_temp_c: stage.target_temp_c,
                fermentation: stage.is_fermentation,
            };
            info!("Stage {} '{}' started", index, stage.label);
            self.push_event(event);
        }
        self.run_dirty = true;
    }

    fn close_stage(&mut self, index: usize) {
        if let Some(slot) = self.run.actual_stage_end.get_mut(index) {
            *slot = Some(self.wall_now);
        }
        let elapsed_secs = self.stage_elapsed_ms() / 1000;
        let label = self.current_stage().map(|s| s.label.clone()).unwrap_or_default();
        if self.ferment.is_active() {
            info!(
                "Stage {} fermentation done: {:.0} weighted s at factor {:.2}",
                index,
                self.ferment.weighted_elapsed_secs(),
                self.ferment.factor()
            );
        }
        self.ferment.clear();
        self.push_event(CoreEvent::StageCompleted {
            stage_index: index,
            label,
            elapsed_secs,
        });
        self.run_dirty = true;
    }

    /// Drop the active program after a program-data failure mid-run.
    pub fn abandon_program(&mut self) {
        warn!("Active program abandoned");
        self.reset_run();
        self.program = None;
        self.run.active_program_id = None;
    }
}
