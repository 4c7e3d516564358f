//! Mock adapters for integration tests.
//!
//! Records actuator levels and scripts raw ADC values so tests can drive
//! the full core without touching real GPIO or ADC registers.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use breadmaker::app::events::CoreEvent;
use breadmaker::app::ports::{
    ActuatorPort, ClockPort, EventSink, ProgramStore, ResumeStore, SensorPort, SettingsError,
    SettingsStore, StoreError,
};
use breadmaker::app::service::ControlCore;
use breadmaker::config::SystemConfig;
use breadmaker::error::SensorError;
use breadmaker::fsm::context::ResumeSnapshot;
use breadmaker::program::{MixStep, Program, ProgramMetadata, Stage};
use breadmaker::sensors::calibration::{CalibrationPoint, CalibrationTable};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

/// Control period used by every harness tick.
pub const TICK_MS: u64 = 100;

// ── Actuator level record ─────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCall {
    Heater(bool),
    Motor(bool),
    Light(bool),
    Buzzer(bool),
}

// ── MockHardware ──────────────────────────────────────────────

/// Raw reads come from `script` first, then from `raw`.  `None` in either
/// place is a failed ADC read.
pub struct MockHardware {
    pub raw: Option<i32>,
    pub script: VecDeque<Option<i32>>,
    pub reads: u32,
    /// Level changes only, in order.
    pub changes: Vec<ActuatorCall>,
    pub heater: bool,
    pub motor: bool,
    pub light: bool,
    pub buzzer: bool,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self {
            raw: Some(raw_for(25.0)),
            script: VecDeque::new(),
            reads: 0,
            changes: Vec::new(),
            heater: false,
            motor: false,
            light: false,
            buzzer: false,
        }
    }

    pub fn set_temperature(&mut self, temp_c: f32) {
        self.raw = Some(raw_for(temp_c));
    }

    pub fn fail_reads(&mut self) {
        self.raw = None;
    }

    pub fn heater_switched_on(&self) -> bool {
        self.changes.contains(&ActuatorCall::Heater(true))
    }

    fn record(&mut self, call: ActuatorCall) {
        let (level, on) = match call {
            ActuatorCall::Heater(on) => (&mut self.heater, on),
            ActuatorCall::Motor(on) => (&mut self.motor, on),
            ActuatorCall::Light(on) => (&mut self.light, on),
            ActuatorCall::Buzzer(on) => (&mut self.buzzer, on),
        };
        if *level != on {
            *level = on;
            self.changes.push(call);
        }
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorPort for MockHardware {
    fn read_raw_adc(&mut self) -> Result<i32, SensorError> {
        self.reads += 1;
        let value = self.script.pop_front().unwrap_or(self.raw);
        value.ok_or(SensorError::AdcReadFailed)
    }
}

impl ActuatorPort for MockHardware {
    fn set_heater(&mut self, on: bool) {
        self.record(ActuatorCall::Heater(on));
    }

    fn set_motor(&mut self, on: bool) {
        self.record(ActuatorCall::Motor(on));
    }

    fn set_light(&mut self, on: bool) {
        self.record(ActuatorCall::Light(on));
    }

    fn set_buzzer(&mut self, on: bool) {
        self.record(ActuatorCall::Buzzer(on));
    }
}

// ── ManualClock ───────────────────────────────────────────────

/// Monotonic and wall time advanced together by hand.  Wall time starts at
/// 2026-03-14 07:00:00.
pub struct ManualClock {
    now_ms: Cell<u64>,
}

#[allow(dead_code)]
impl ManualClock {
    pub fn new() -> Self {
        Self { now_ms: Cell::new(0) }
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }

    pub fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .and_then(|d| d.and_hms_opt(7, 0, 0))
            .expect("valid base time")
    }
}

impl ClockPort for ManualClock {
    fn monotonic_ms(&self) -> u64 {
        self.now_ms.get()
    }

    fn local_now(&self) -> NaiveDateTime {
        Self::base() + TimeDelta::milliseconds(self.now_ms.get() as i64)
    }
}

// ── MockProgramStore ──────────────────────────────────────────

pub struct MockProgramStore {
    pub programs: Vec<Program>,
    pub fail: bool,
}

#[allow(dead_code)]
impl MockProgramStore {
    pub fn new(programs: Vec<Program>) -> Self {
        Self {
            programs,
            fail: false,
        }
    }
}

impl ProgramStore for MockProgramStore {
    fn load_program_metadata(&self) -> Result<Vec<ProgramMetadata>, StoreError> {
        if self.fail {
            return Err(StoreError::IoError);
        }
        Ok(self.programs.iter().map(Program::metadata).collect())
    }

    fn load_program(&self, id: u32) -> Result<Program, StoreError> {
        if self.fail {
            return Err(StoreError::IoError);
        }
        self.programs
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn save_program(&mut self, program: &Program) -> Result<(), StoreError> {
        self.programs.retain(|p| p.id != program.id);
        self.programs.push(program.clone());
        Ok(())
    }
}

// ── MockSettings / MockResume ─────────────────────────────────

#[derive(Default)]
pub struct MockSettings {
    pub stored: RefCell<Option<SystemConfig>>,
    pub saves: Cell<u32>,
}

impl SettingsStore for MockSettings {
    fn load(&self) -> Result<SystemConfig, SettingsError> {
        self.stored.borrow().clone().ok_or(SettingsError::NotFound)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), SettingsError> {
        self.saves.set(self.saves.get() + 1);
        *self.stored.borrow_mut() = Some(config.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockResume {
    pub stored: RefCell<Option<ResumeSnapshot>>,
    pub writes: Cell<u32>,
    pub clears: Cell<u32>,
}

impl ResumeStore for MockResume {
    fn load_resume(&self) -> Result<Option<ResumeSnapshot>, SettingsError> {
        Ok(self.stored.borrow().clone())
    }

    fn save_resume(&self, snapshot: &ResumeSnapshot) -> Result<(), SettingsError> {
        self.writes.set(self.writes.get() + 1);
        *self.stored.borrow_mut() = Some(snapshot.clone());
        Ok(())
    }

    fn clear_resume(&self) -> Result<(), SettingsError> {
        self.clears.set(self.clears.get() + 1);
        *self.stored.borrow_mut() = None;
        Ok(())
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<CoreEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&CoreEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn any(&self, pred: impl Fn(&CoreEvent) -> bool) -> bool {
        self.events.iter().any(pred)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &CoreEvent) {
        self.events.push(event.clone());
    }
}

// ── Fixtures ──────────────────────────────────────────────────

/// Linear table: raw = 10 × °C.
pub fn linear_calibration() -> CalibrationTable {
    CalibrationTable::from_points(&[
        CalibrationPoint {
            raw: 0,
            temperature_c: 0.0,
        },
        CalibrationPoint {
            raw: 4000,
            temperature_c: 400.0,
        },
    ])
    .expect("valid table")
}

pub fn raw_for(temp_c: f32) -> i32 {
    (temp_c * 10.0).round() as i32
}

/// Defaults with a linear calibration table and no startup delay.
pub fn test_config() -> SystemConfig {
    SystemConfig {
        calibration: linear_calibration(),
        startup_delay_ms: 0,
        ..SystemConfig::default()
    }
}

#[allow(dead_code)]
pub fn stage(label: &str, minutes: u32, target_c: f32) -> Stage {
    Stage {
        label: label.into(),
        duration_minutes: minutes,
        target_temp_c: target_c,
        mix_pattern: Vec::new(),
        no_mix: true,
        is_fermentation: false,
        instructions: String::new(),
    }
}

#[allow(dead_code)]
pub fn ferment_stage(label: &str, minutes: u32, target_c: f32) -> Stage {
    Stage {
        is_fermentation: true,
        ..stage(label, minutes, target_c)
    }
}

#[allow(dead_code)]
pub fn mix_stage(label: &str, minutes: u32, pattern: &[(u32, u32)]) -> Stage {
    Stage {
        mix_pattern: pattern
            .iter()
            .map(|&(mix_secs, wait_secs)| MixStep {
                mix_secs,
                wait_secs,
            })
            .collect(),
        no_mix: false,
        ..stage(label, minutes, 0.0)
    }
}

pub fn program(id: u32, stages: Vec<Stage>) -> Program {
    Program {
        id,
        name: format!("Program {id}"),
        notes: String::new(),
        ferment_baseline_temp_c: 20.0,
        ferment_q10: 2.0,
        stages,
    }
}

// ── Harness ───────────────────────────────────────────────────

/// Core plus every mock it talks to.
pub struct Harness {
    pub core: ControlCore,
    pub hw: MockHardware,
    pub clock: ManualClock,
    pub programs: MockProgramStore,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(programs: Vec<Program>) -> Self {
        Self::with_config(test_config(), programs)
    }

    pub fn with_config(config: SystemConfig, programs: Vec<Program>) -> Self {
        let mut core = ControlCore::new(config);
        let clock = ManualClock::new();
        let mut sink = RecordingSink::new();
        core.start(&clock, &mut sink);
        Self {
            core,
            hw: MockHardware::new(),
            clock,
            programs: MockProgramStore::new(programs),
            sink,
        }
    }

    pub fn command(
        &mut self,
        cmd: breadmaker::app::commands::CoreCommand,
    ) -> breadmaker::error::Result<()> {
        self.core
            .handle_command(cmd, &self.clock, &self.programs, &mut self.sink)
    }

    /// One control tick at the current time.
    pub fn tick(&mut self) {
        self.core.tick(&mut self.hw, &self.clock, &mut self.sink);
    }

    /// Advance by `ms` in control periods, ticking after each step.
    pub fn run_for(&mut self, ms: u64) {
        for _ in 0..ms / TICK_MS {
            self.clock.advance(TICK_MS);
            self.tick();
        }
    }

    /// Select `id` and start it from `stage`.
    pub fn start(&mut self, id: u32, stage: Option<usize>) {
        use breadmaker::app::commands::CoreCommand;
        self.command(CoreCommand::SelectProgram(id))
            .expect("program selectable");
        self.command(CoreCommand::Start {
            stage,
            at_time: None,
        })
        .expect("program startable");
    }
}
