//! Control core service: the hexagonal core.
//!
//! [`ControlCore`] owns the run state machine, temperature filter, heater
//! controller, and safety monitor.  It exposes a hardware-agnostic API:
//! one [`tick`](ControlCore::tick) per control period, one
//! [`handle_command`](ControlCore::handle_command) per external request.
//! All I/O flows through port traits injected at call sites.
//!
//! ```text
//!   SensorPort ──▶ ┌──────────────────────────────────┐ ──▶ EventSink
//!    ClockPort ──▶ │            ControlCore           │
//! ActuatorPort ◀── │ Filter · Safety · FSM · PID/window│ ◀── CoreCommand
//!                  └──────────────────────────────────┘
//!                        │ deferred           │ deferred
//!                        ▼                    ▼
//!                  SettingsStore          ResumeStore
//! ```
//!
//! Tick order: sample → safety → stage logic → controller → outputs →
//! events.  Commands are applied between ticks, so no handler ever sees a
//! half-updated run.

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::{self, SystemConfig};
use crate::control::pid::PidGains;
use crate::control::window::WindowSettings;
use crate::control::{ControllerState, HeaterController};
use crate::error::{CommandFault, ConfigFault, Error, ProgramFault, Result};
use crate::fermentation::{self, FermentationState, FermentationTracker, Forecast, RunPosition};
use crate::fsm::context::{ResumeSnapshot, RunContext, RunState, StageAdvance};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::program::Program;
use crate::safety::{SafetyMonitor, SafetyState};
use crate::scheduler::ScheduledStart;
use crate::sensors::filter::TemperatureFilter;

use super::commands::{CoreCommand, Output};
use super::events::CoreEvent;
use super::ports::{
    ActuatorPort, ClockPort, EventSink, ProgramStore, ResumeStore, SensorPort, SettingsError,
    SettingsStore, StoreError,
};

/// Resume snapshot refresh period while a program runs.
const RESUME_CHECKPOINT_MS: u64 = 60_000;

/// Highest manual setpoint accepted (°C).
const MAX_MANUAL_SETPOINT_C: f32 = 250.0;

// ───────────────────────────────────────────────────────────────
// Status types
// ───────────────────────────────────────────────────────────────

/// Levels of the four binary outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutputFlags {
    pub heater: bool,
    pub motor: bool,
    pub light: bool,
    pub buzzer: bool,
}

/// Read-only status for display and network collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct CoreStatus {
    pub state: StateId,
    pub run: RunState,
    pub program_name: Option<String>,
    pub stage_label: Option<String>,
    pub stage_count: usize,
    pub stage_elapsed_secs: u64,
    pub fermentation: FermentationState,
    pub controller: ControllerState,
    pub safety: SafetyState,
    /// Levels applied on the last tick.
    pub outputs: OutputFlags,
    pub temperature_c: f32,
    pub raw_temperature_c: f32,
    /// Effective heater setpoint (stage target or manual setpoint).
    pub setpoint_c: f32,
    pub manual_setpoint_c: f32,
    pub forecast: Option<Forecast>,
    pub scheduled_start_in_secs: Option<i64>,
    pub startup_delay_remaining_ms: u64,
}

// ───────────────────────────────────────────────────────────────
// ControlCore
// ───────────────────────────────────────────────────────────────

pub struct ControlCore {
    fsm: Fsm,
    ctx: RunContext,
    config: SystemConfig,
    filter: TemperatureFilter,
    controller: HeaterController,
    safety: SafetyMonitor,

    /// Operator-requested levels (manual mode, light, buzzer).
    operator: OutputFlags,
    outputs: OutputFlags,
    manual_setpoint_c: f32,
    effective_setpoint_c: f32,

    boot_ms: u64,
    now_ms: u64,
    tick_count: u64,
    last_faults: u8,
    emergency_reported: bool,

    settings_dirty: bool,
    save_requested: bool,
    dirty_since_ms: u64,
    last_checkpoint_ms: u64,
}

impl ControlCore {
    /// Construct the core from configuration.
    ///
    /// Does **not** start the FSM; call [`start`](Self::start) next.
    pub fn new(config: SystemConfig) -> Self {
        let filter = TemperatureFilter::new(
            config.temp_samples,
            config.temp_reject,
            config.temp_interval_ms,
        );
        let controller = HeaterController::new(&config);
        let safety = SafetyMonitor::new(config.safety);
        let ctx = RunContext::new(&config);
        let fsm = Fsm::new(build_state_table(), StateId::Idle);

        Self {
            fsm,
            ctx,
            config,
            filter,
            controller,
            safety,
            operator: OutputFlags::default(),
            outputs: OutputFlags::default(),
            manual_setpoint_c: 0.0,
            effective_setpoint_c: 0.0,
            boot_ms: 0,
            now_ms: 0,
            tick_count: 0,
            last_faults: 0,
            emergency_reported: false,
            settings_dirty: false,
            save_requested: false,
            dirty_since_ms: 0,
            last_checkpoint_ms: 0,
        }
    }

    /// Construct from stored settings, falling back to defaults when none
    /// are stored or the stored set fails validation.
    pub fn with_settings(store: &impl SettingsStore) -> Self {
        let config = match store.load() {
            Ok(config) => match config.validate() {
                Ok(()) => config,
                Err(e) => {
                    warn!("Stored settings rejected ({}), using defaults", e);
                    SystemConfig::default()
                }
            },
            Err(SettingsError::NotFound) => {
                info!("No stored settings, using defaults");
                SystemConfig::default()
            }
            Err(e) => {
                warn!("Settings load failed ({}), using defaults", e);
                SystemConfig::default()
            }
        };
        Self::new(config)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Start the FSM in Idle.  The startup delay counts from here.
    pub fn start(&mut self, clock: &impl ClockPort, sink: &mut impl EventSink) {
        self.now_ms = clock.monotonic_ms();
        self.boot_ms = self.now_ms;
        self.ctx.set_clock(self.now_ms, clock.local_now());
        self.fsm.start(&mut self.ctx);
        sink.emit(&CoreEvent::Started(self.fsm.current_state()));
        info!("ControlCore started in {:?}", self.fsm.current_state());
    }

    /// Adopt a run captured before a power cycle.
    pub fn restore(
        &mut self,
        snapshot: &ResumeSnapshot,
        programs: &impl ProgramStore,
        sink: &mut impl EventSink,
    ) -> Result<StateId> {
        let program = load_program(programs, snapshot.program_id)?;
        let prev = self.fsm.current_state();
        let running = self.ctx.restore(snapshot, program)?;
        let target = if running { StateId::Running } else { StateId::Paused };
        self.fsm.force_transition(target, &mut self.ctx);
        self.flush_events(prev, sink);
        Ok(target)
    }

    /// Load and adopt the stored resume snapshot, discarding it if it no
    /// longer matches its program.
    pub fn resume_from_store(
        &mut self,
        store: &impl ResumeStore,
        programs: &impl ProgramStore,
        sink: &mut impl EventSink,
    ) -> Option<StateId> {
        let snapshot = match store.load_resume() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return None,
            Err(e) => {
                warn!("Resume snapshot unreadable: {}", e);
                discard_resume(store);
                return None;
            }
        };
        match self.restore(&snapshot, programs, sink) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Resume snapshot rejected: {}", e);
                discard_resume(store);
                None
            }
        }
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle.
    ///
    /// The `hw` parameter satisfies **both** [`SensorPort`] and
    /// [`ActuatorPort`], which avoids a double mutable borrow while
    /// keeping the port boundary explicit.
    pub fn tick(
        &mut self,
        hw: &mut (impl SensorPort + ActuatorPort),
        clock: &impl ClockPort,
        sink: &mut impl EventSink,
    ) {
        let started_us = clock.monotonic_us();
        self.tick_count += 1;
        self.now_ms = clock.monotonic_ms();
        let now = self.now_ms;
        self.ctx.set_clock(now, clock.local_now());
        self.ctx.start_hold_remaining_ms = self.startup_delay_remaining_ms();
        let prev_state = self.fsm.current_state();

        // 1. Temperature acquisition
        if self.filter.is_due(now) {
            match hw.read_raw_adc() {
                Ok(raw) => {
                    let temp = self.filter.filter_sample(raw, now, &self.config.calibration);
                    self.safety.record_reading(temp);
                }
                Err(_) => {
                    self.filter.mark_missed(now);
                    self.safety.record_reading(f32::NAN);
                }
            }
        }
        let temp = self.filter.output();
        self.ctx.temperature_c = temp;

        // 2. Safety evaluation
        let faults = self
            .safety
            .evaluate(temp, self.outputs.heater, self.controller.output(), now);
        self.report_faults(faults);
        if self.safety.emergency_shutdown() {
            if !self.emergency_reported {
                self.emergency_reported = true;
                if self.fsm.current_state() == StateId::Running {
                    warn!("Emergency shutdown: pausing program");
                    self.fsm.force_transition(StateId::Paused, &mut self.ctx);
                }
                let reason = self.safety.shutdown_reason().to_string();
                self.ctx.push_event(CoreEvent::EmergencyShutdown { reason });
            }
        } else {
            self.emergency_reported = false;
        }

        // 3. Stage logic
        self.fsm.tick(&mut self.ctx);

        // 4. Heater controller
        self.update_setpoint();
        let enabled = self.safety.controller_enabled();
        let step = self
            .controller
            .update(now, self.effective_setpoint_c, temp, enabled);
        if let Some(name) = step.switched_profile {
            self.config.active_profile = Some(name.clone());
            self.mark_settings_dirty();
            self.ctx.push_event(CoreEvent::ProfileSwitched { name });
        }

        // 5. Outputs
        self.outputs = self.resolve_outputs(step.heater_on);
        apply_outputs(self.outputs, hw);

        // 6. Events
        self.flush_events(prev_state, sink);

        self.safety
            .record_loop_time(clock.monotonic_us().saturating_sub(started_us));
    }

    // ── Command handling ──────────────────────────────────────

    /// Validate and apply an external command.  A rejected command leaves
    /// the core unchanged and returns the reason.
    pub fn handle_command(
        &mut self,
        cmd: CoreCommand,
        clock: &impl ClockPort,
        programs: &impl ProgramStore,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        self.now_ms = clock.monotonic_ms();
        self.ctx.set_clock(self.now_ms, clock.local_now());
        let prev = self.fsm.current_state();
        let name = cmd.name();

        let result = self.dispatch(cmd, programs);
        match &result {
            Ok(()) => debug!("Command {} applied", name),
            Err(e) => warn!("Command {} rejected: {} ({:?})", name, e, e.category()),
        }
        self.flush_events(prev, sink);
        result
    }

    fn dispatch(&mut self, cmd: CoreCommand, programs: &impl ProgramStore) -> Result<()> {
        match cmd {
            CoreCommand::Start { stage, at_time } => {
                self.start_program(stage.unwrap_or(0), at_time.as_deref())
            }
            CoreCommand::Stop => {
                self.stop_program();
                Ok(())
            }
            CoreCommand::Pause => {
                self.require(StateId::Running, CommandFault::NotRunning)?;
                self.fsm.force_transition(StateId::Paused, &mut self.ctx);
                Ok(())
            }
            CoreCommand::Resume => {
                self.require(StateId::Paused, CommandFault::NotPaused)?;
                self.fsm.force_transition(StateId::Running, &mut self.ctx);
                Ok(())
            }
            CoreCommand::Advance => {
                self.require(StateId::Running, CommandFault::NotRunning)?;
                match self.ctx.advance() {
                    Ok(StageAdvance::Next(_)) => Ok(()),
                    Ok(StageAdvance::Completed) => {
                        self.finish_program();
                        Ok(())
                    }
                    Err(e) => {
                        self.abandon_program();
                        Err(e.into())
                    }
                }
            }
            CoreCommand::Back => {
                self.require(StateId::Running, CommandFault::NotRunning)?;
                match self.ctx.back() {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        self.abandon_program();
                        Err(e.into())
                    }
                }
            }
            CoreCommand::SelectProgram(id) => self.select_program(id, programs),

            CoreCommand::SetManualMode(on) => {
                self.ctx.run.manual_mode = on;
                if !on {
                    self.operator.heater = false;
                    self.operator.motor = false;
                }
                info!("Manual mode {}", if on { "on" } else { "off" });
                Ok(())
            }
            CoreCommand::SetManualSetpoint(temp_c) => {
                if !(0.0..=MAX_MANUAL_SETPOINT_C).contains(&temp_c) {
                    return Err(ConfigFault::InvalidSetpoint(temp_c).into());
                }
                self.manual_setpoint_c = temp_c;
                Ok(())
            }
            CoreCommand::SetOutput { output, on } => self.set_output(output, on),
            CoreCommand::OverrideStageDuration { minutes } => {
                self.require(StateId::Running, CommandFault::NotRunning)?;
                self.ctx.override_duration(minutes)
            }

            CoreCommand::SetPid { kp, ki, kd } => {
                config::validate_gains(kp, ki, kd)?;
                self.controller.set_gains(PidGains { kp, ki, kd });
                self.config.kp = kp;
                self.config.ki = ki;
                self.config.kd = kd;
                info!("PID gains set: kp={} ki={} kd={}", kp, ki, kd);
                self.mark_settings_dirty();
                Ok(())
            }
            CoreCommand::SwitchProfile(name) => {
                self.controller.switch_profile(&name)?;
                info!("PID profile switched to {}", name);
                self.config.active_profile = Some(name.clone());
                self.mark_settings_dirty();
                self.ctx.push_event(CoreEvent::ProfileSwitched { name });
                Ok(())
            }
            CoreCommand::SetAutoSwitching(on) => {
                self.controller.set_auto_switching(on);
                self.config.auto_switching = on;
                self.mark_settings_dirty();
                Ok(())
            }
            CoreCommand::SetWindowSize { window_ms } => {
                let window = WindowSettings {
                    window_ms,
                    ..self.config.window
                };
                config::validate_window(&window)?;
                self.controller.set_window(window);
                self.config.window = window;
                self.mark_settings_dirty();
                Ok(())
            }
            CoreCommand::SetFilter {
                samples,
                reject,
                interval_ms,
            } => {
                let mut candidate = self.config.clone();
                candidate.temp_samples = samples;
                candidate.temp_reject = reject;
                candidate.temp_interval_ms = interval_ms;
                candidate.validate()?;
                self.filter.reconfigure(samples, reject, interval_ms)?;
                self.config = candidate;
                self.mark_settings_dirty();
                Ok(())
            }

            CoreCommand::AddCalibrationPoint { raw, temperature_c } => {
                self.config.calibration.add_point(raw, temperature_c)?;
                self.mark_settings_dirty();
                Ok(())
            }
            CoreCommand::UpdateCalibrationPoint {
                old_raw,
                raw,
                temperature_c,
            } => {
                self.config
                    .calibration
                    .update_point(old_raw, raw, temperature_c)?;
                self.mark_settings_dirty();
                Ok(())
            }
            CoreCommand::DeleteCalibrationPoint { raw } => {
                self.config.calibration.delete_point(raw)?;
                self.mark_settings_dirty();
                Ok(())
            }

            CoreCommand::SetSafetyEnabled(on) => {
                self.safety.set_safety_enabled(on);
                if !self.safety.emergency_shutdown() {
                    self.emergency_reported = false;
                }
                Ok(())
            }
            CoreCommand::SaveSettings => {
                self.mark_settings_dirty();
                self.save_requested = true;
                Ok(())
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Snapshot of every state struct for status reporting.
    pub fn snapshot(&self) -> CoreStatus {
        let state = self.fsm.current_state();
        let program = self.ctx.program.as_ref();
        let stage = self.ctx.current_stage();
        let wall_now = self.ctx.wall_now();
        let forecast = match (state, program) {
            (StateId::Running | StateId::Paused, Some(program)) => {
                let position = RunPosition {
                    stage_index: self.ctx.run.stage_index,
                    stage_elapsed_ms: self.ctx.stage_elapsed_ms(),
                    actual_stage_ends: &self.ctx.run.actual_stage_end,
                    actual_stage_starts: &self.ctx.run.actual_stage_start,
                    current_temp_c: self.ctx.temperature_c,
                };
                fermentation::forecast(program, &position, &self.ctx.ferment, wall_now)
            }
            _ => None,
        };

        CoreStatus {
            state,
            run: self.ctx.run.clone(),
            program_name: program.map(|p| p.name.clone()),
            stage_label: stage.map(|s| s.label.clone()),
            stage_count: program.map_or(0, |p| p.stages.len()),
            stage_elapsed_secs: self.ctx.stage_elapsed_ms() / 1000,
            fermentation: self.ctx.ferment.state().clone(),
            controller: self.controller.state(),
            safety: self.safety.state(),
            outputs: self.outputs,
            temperature_c: self.filter.output(),
            raw_temperature_c: self.filter.last_raw(),
            setpoint_c: self.effective_setpoint_c,
            manual_setpoint_c: self.manual_setpoint_c,
            forecast,
            scheduled_start_in_secs: self
                .ctx
                .run
                .scheduled_start
                .map(|s| s.secs_until(wall_now)),
            startup_delay_remaining_ms: self.startup_delay_remaining_ms(),
        }
    }

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn fault_flags(&self) -> u8 {
        self.safety.faults()
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn run_state(&self) -> &RunState {
        &self.ctx.run
    }

    pub fn program(&self) -> Option<&Program> {
        self.ctx.program.as_ref()
    }

    pub fn fermentation(&self) -> &FermentationTracker {
        &self.ctx.ferment
    }

    pub fn safety(&self) -> &SafetyMonitor {
        &self.safety
    }

    pub fn controller(&self) -> &HeaterController {
        &self.controller
    }

    pub fn outputs(&self) -> OutputFlags {
        self.outputs
    }

    pub fn temperature_c(&self) -> f32 {
        self.filter.output()
    }

    pub fn setpoint_c(&self) -> f32 {
        self.effective_setpoint_c
    }

    pub fn stage_elapsed_ms(&self) -> u64 {
        self.ctx.stage_elapsed_ms()
    }

    pub fn resume_snapshot(&self) -> Option<ResumeSnapshot> {
        self.ctx.resume_snapshot()
    }

    pub fn startup_delay_remaining_ms(&self) -> u64 {
        let since_boot = self.now_ms.saturating_sub(self.boot_ms);
        u64::from(self.config.startup_delay_ms).saturating_sub(since_boot)
    }

    // ── Internal ──────────────────────────────────────────────

    fn require(&self, state: StateId, fault: CommandFault) -> Result<()> {
        if self.fsm.current_state() == state {
            Ok(())
        } else {
            Err(fault.into())
        }
    }

    fn start_program(&mut self, stage: usize, at_time: Option<&str>) -> Result<()> {
        let stage_count = self
            .ctx
            .program
            .as_ref()
            .map(|p| p.stages.len())
            .ok_or(ProgramFault::NoProgramSelected)?;
        if stage_count == 0 {
            return Err(ProgramFault::NoStages.into());
        }
        if stage >= stage_count {
            return Err(ConfigFault::InvalidStageIndex {
                index: stage,
                stage_count,
            }
            .into());
        }

        if let Some(at_time) = at_time {
            let scheduled = ScheduledStart::from_time_string(at_time, stage, self.ctx.wall_now())?;
            self.ctx.run.scheduled_start = Some(scheduled);
            self.ctx.run_dirty = true;
            self.ctx.push_event(CoreEvent::ScheduledStartArmed {
                at: scheduled.at,
                stage_index: stage,
            });
            return Ok(());
        }

        let remaining_ms = self.startup_delay_remaining_ms();
        if remaining_ms > 0 {
            return Err(CommandFault::StartupDelay { remaining_ms }.into());
        }
        self.ctx.begin_run(stage)?;
        self.fsm.force_transition(StateId::Running, &mut self.ctx);
        Ok(())
    }

    fn stop_program(&mut self) {
        let was_active = self.fsm.current_state() != StateId::Idle;
        let program_id = self.ctx.run.active_program_id;
        self.ctx.reset_run();
        self.fsm.force_transition(StateId::Idle, &mut self.ctx);
        if was_active {
            self.ctx.beep();
            self.ctx.push_event(CoreEvent::ProgramStopped { program_id });
        }
    }

    /// Manual advance past the last stage.
    fn finish_program(&mut self) {
        let event = self
            .ctx
            .program
            .as_ref()
            .map(|p| CoreEvent::ProgramCompleted {
                program_id: p.id,
                name: p.name.clone(),
            });
        if let Some(event) = event {
            self.ctx.push_event(event);
        }
        self.ctx.reset_run();
        self.fsm.force_transition(StateId::Idle, &mut self.ctx);
        self.ctx.beep();
    }

    fn abandon_program(&mut self) {
        self.ctx.abandon_program();
        self.fsm.force_transition(StateId::Idle, &mut self.ctx);
    }

    fn select_program(&mut self, id: u32, programs: &impl ProgramStore) -> Result<()> {
        let program = load_program(programs, id)?;
        if self.fsm.current_state() != StateId::Idle {
            let program_id = self.ctx.run.active_program_id;
            self.ctx.reset_run();
            self.fsm.force_transition(StateId::Idle, &mut self.ctx);
            self.ctx.push_event(CoreEvent::ProgramStopped { program_id });
        }
        self.ctx.select_program(program);
        Ok(())
    }

    fn set_output(&mut self, output: Output, on: bool) -> Result<()> {
        match output {
            Output::Heater | Output::Motor if !self.ctx.run.manual_mode => {
                Err(CommandFault::NotManualMode.into())
            }
            Output::Heater => {
                self.operator.heater = on;
                Ok(())
            }
            Output::Motor => {
                self.operator.motor = on;
                Ok(())
            }
            Output::Light => {
                self.operator.light = on;
                Ok(())
            }
            Output::Buzzer => {
                self.operator.buzzer = on;
                Ok(())
            }
        }
    }

    fn update_setpoint(&mut self) {
        let target = if self.ctx.run.manual_mode {
            self.manual_setpoint_c
        } else {
            self.ctx.setpoint_c
        };
        if target != self.effective_setpoint_c {
            info!(
                "Setpoint {:.1} -> {:.1}\u{00b0}C",
                self.effective_setpoint_c, target
            );
            self.effective_setpoint_c = target;
            self.ctx
                .push_event(CoreEvent::TargetChanged { setpoint_c: target });
        }
    }

    fn resolve_outputs(&self, window_heater: bool) -> OutputFlags {
        let manual = self.ctx.run.manual_mode;
        let heater = self.safety.controller_enabled()
            && if manual && self.manual_setpoint_c <= 0.0 {
                self.operator.heater
            } else {
                window_heater
            };
        let motor = !self.safety.emergency_shutdown()
            && if manual {
                self.operator.motor
            } else {
                self.fsm.current_state() == StateId::Running && self.ctx.motor_demand
            };
        OutputFlags {
            heater,
            motor,
            light: self.operator.light,
            buzzer: self.operator.buzzer || self.ctx.buzzer_active(),
        }
    }

    fn report_faults(&mut self, faults: u8) {
        if faults == self.last_faults {
            return;
        }
        if faults & !self.last_faults != 0 {
            self.ctx.push_event(CoreEvent::FaultDetected(faults));
        } else if faults == 0 {
            self.ctx.push_event(CoreEvent::FaultCleared);
        }
        self.last_faults = faults;
    }

    fn flush_events(&mut self, prev: StateId, sink: &mut impl EventSink) {
        for event in self.ctx.drain_events() {
            sink.emit(&event);
        }
        let current = self.fsm.current_state();
        if current != prev {
            sink.emit(&CoreEvent::StateChanged {
                from: prev,
                to: current,
            });
        }
    }

    // ── Deferred persistence ──────────────────────────────────

    /// Mark the settings as modified.  Every change restarts the quiet
    /// period before the write.
    pub fn mark_settings_dirty(&mut self) {
        self.settings_dirty = true;
        self.dirty_since_ms = self.now_ms;
    }

    /// Save once the settings have been quiet for `settings_save_delay_ms`
    /// (or immediately after an explicit save request).
    /// Returns `true` if the settings were saved.
    pub fn auto_save_if_needed(&mut self, store: &impl SettingsStore) -> bool {
        if !self.settings_dirty {
            return false;
        }
        let quiet_ms = self.now_ms.saturating_sub(self.dirty_since_ms);
        if !self.save_requested && quiet_ms < u64::from(self.config.settings_save_delay_ms) {
            return false;
        }
        self.save_settings(store, "auto-saved")
    }

    /// Force-save if dirty (call before a planned restart).
    pub fn force_save_if_dirty(&mut self, store: &impl SettingsStore) {
        if self.settings_dirty {
            self.save_settings(store, "force-saved");
        }
    }

    pub fn is_settings_dirty(&self) -> bool {
        self.settings_dirty
    }

    fn save_settings(&mut self, store: &impl SettingsStore, how: &str) -> bool {
        match store.save(&self.config) {
            Ok(()) => {
                self.settings_dirty = false;
                self.save_requested = false;
                info!("Settings {}", how);
                true
            }
            Err(e) => {
                warn!("Settings save failed: {}", e);
                false
            }
        }
    }

    /// Write the resume snapshot after run-state changes, and periodically
    /// while running.  Clears the stored snapshot when nothing is active.
    pub fn persist_run_if_needed(&mut self, store: &impl ResumeStore) -> bool {
        let checkpoint_due = self.ctx.run.is_running
            && self.now_ms.saturating_sub(self.last_checkpoint_ms) >= RESUME_CHECKPOINT_MS;
        if !self.ctx.run_dirty && !checkpoint_due {
            return false;
        }
        self.last_checkpoint_ms = self.now_ms;
        let result = match self.ctx.resume_snapshot() {
            Some(snapshot) => store.save_resume(&snapshot),
            None => store.clear_resume(),
        };
        match result {
            Ok(()) => {
                self.ctx.run_dirty = false;
                true
            }
            Err(e) => {
                warn!("Resume snapshot write failed: {}", e);
                false
            }
        }
    }
}

fn apply_outputs(outputs: OutputFlags, hw: &mut impl ActuatorPort) {
    hw.set_heater(outputs.heater);
    hw.set_motor(outputs.motor);
    hw.set_light(outputs.light);
    hw.set_buzzer(outputs.buzzer);
}

fn discard_resume(store: &impl ResumeStore) {
    if let Err(e) = store.clear_resume() {
        warn!("Resume snapshot clear failed: {}", e);
    }
}

/// Fetch a program that the store lists.
fn load_program(programs: &impl ProgramStore, id: u32) -> Result<Program> {
    let listed = programs.load_program_metadata().map_err(|e| {
        warn!("Program metadata unavailable: {}", e);
        Error::from(ProgramFault::StoreFailure)
    })?;
    if !listed.iter().any(|m| m.id == id) {
        return Err(ProgramFault::NotFound(id).into());
    }
    programs.load_program(id).map_err(|e| match e {
        StoreError::NotFound(_) => ProgramFault::NotFound(id).into(),
        other => {
            warn!("Program {} load failed: {}", id, other);
            ProgramFault::StoreFailure.into()
        }
    })
}
