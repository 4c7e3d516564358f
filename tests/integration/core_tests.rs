//! Integration tests for the ControlCore → FSM → actuators pipeline.
//!
//! These run on the host and drive the full command and tick path through
//! the mock adapters in `mock_hw`.

use breadmaker::app::commands::{CoreCommand, Output};
use breadmaker::app::events::CoreEvent;
use breadmaker::app::queue::CommandQueue;
use breadmaker::config::SystemConfig;
use breadmaker::error::{CommandFault, ConfigFault, Error, ProgramFault, SafetyFault};
use breadmaker::fsm::StateId;
use breadmaker::program::{Program, Stage};
use chrono::TimeDelta;

use crate::mock_hw::{
    ferment_stage, linear_calibration, mix_stage, program, stage, ActuatorCall, Harness,
    ManualClock, MockResume, MockSettings, TICK_MS,
};

fn two_stage() -> Harness {
    Harness::new(vec![program(
        1,
        vec![stage("Knead", 10, 0.0), stage("Bake", 40, 190.0)],
    )])
}

// ── Start / stop ──────────────────────────────────────────────

#[test]
fn start_enters_first_stage() {
    let mut h = two_stage();
    h.start(1, None);

    assert_eq!(h.core.state(), StateId::Running);
    assert_eq!(h.core.run_state().stage_index, 0);
    assert_eq!(
        h.core.run_state().actual_stage_start[0],
        Some(ManualClock::base())
    );
    assert!(h.sink.any(|e| matches!(e, CoreEvent::ProgramStarted { program_id: 1, stage_index: 0, .. })));
    assert!(h.sink.any(|e| matches!(e, CoreEvent::StageStarted { stage_index: 0, .. })));
    assert!(h.sink.any(|e| *e
        == CoreEvent::StateChanged {
            from: StateId::Idle,
            to: StateId::Running
        }));
}

#[test]
fn start_at_stage_records_only_that_stage() {
    let mut h = two_stage();
    h.start(1, Some(1));
    let run = h.core.run_state();
    assert_eq!(run.stage_index, 1);
    assert_eq!(run.actual_stage_start, vec![None, Some(ManualClock::base())]);
}

#[test]
fn start_rejects_bad_stage_and_missing_program() {
    let mut h = two_stage();
    assert_eq!(
        h.command(CoreCommand::Start { stage: None, at_time: None }),
        Err(Error::Program(ProgramFault::NoProgramSelected))
    );
    h.command(CoreCommand::SelectProgram(1)).unwrap();
    assert_eq!(
        h.command(CoreCommand::Start { stage: Some(2), at_time: None }),
        Err(Error::Config(ConfigFault::InvalidStageIndex { index: 2, stage_count: 2 }))
    );
    assert_eq!(h.core.state(), StateId::Idle);
}

#[test]
fn zero_stage_program_cannot_start() {
    let mut h = Harness::new(vec![program(5, Vec::new())]);
    h.command(CoreCommand::SelectProgram(5)).unwrap();
    assert_eq!(
        h.command(CoreCommand::Start { stage: None, at_time: None }),
        Err(Error::Program(ProgramFault::NoStages))
    );
}

#[test]
fn startup_delay_blocks_early_start() {
    let config = SystemConfig {
        calibration: linear_calibration(),
        ..SystemConfig::default()
    };
    let mut h = Harness::with_config(config, vec![program(1, vec![stage("Knead", 10, 0.0)])]);
    h.command(CoreCommand::SelectProgram(1)).unwrap();
    assert_eq!(
        h.command(CoreCommand::Start { stage: None, at_time: None }),
        Err(Error::Command(CommandFault::StartupDelay { remaining_ms: 15_000 }))
    );
    assert_eq!(h.core.snapshot().startup_delay_remaining_ms, 15_000);
    h.run_for(15_000);
    h.command(CoreCommand::Start { stage: None, at_time: None }).unwrap();
    assert_eq!(h.core.state(), StateId::Running);
}

#[test]
fn stop_returns_to_idle_and_beeps() {
    let mut h = two_stage();
    h.start(1, None);
    h.run_for(5_000);
    h.command(CoreCommand::Stop).unwrap();

    assert_eq!(h.core.state(), StateId::Idle);
    assert_eq!(h.core.run_state().stage_index, 0);
    assert!(h.sink.any(|e| *e == CoreEvent::ProgramStopped { program_id: Some(1) }));

    h.tick();
    assert!(h.hw.buzzer);
    h.run_for(300);
    assert!(!h.hw.buzzer);
    assert!(h.core.resume_snapshot().is_none());
}

#[test]
fn selecting_while_running_stops_the_run() {
    let mut h = Harness::new(vec![
        program(1, vec![stage("Knead", 10, 0.0)]),
        program(2, vec![stage("Rest", 10, 0.0)]),
    ]);
    h.start(1, None);
    h.command(CoreCommand::SelectProgram(2)).unwrap();
    assert_eq!(h.core.state(), StateId::Idle);
    assert_eq!(h.core.program().map(|p| p.id), Some(2));
    assert!(h.sink.any(|e| *e == CoreEvent::ProgramStopped { program_id: Some(1) }));
}

#[test]
fn unknown_or_unreadable_program_is_rejected() {
    let mut h = two_stage();
    assert_eq!(
        h.command(CoreCommand::SelectProgram(42)),
        Err(Error::Program(ProgramFault::NotFound(42)))
    );
    h.programs.fail = true;
    assert_eq!(
        h.command(CoreCommand::SelectProgram(1)),
        Err(Error::Program(ProgramFault::StoreFailure))
    );
    assert!(h.core.program().is_none());
}

// ── Stage navigation ──────────────────────────────────────────

#[test]
fn advance_on_last_stage_completes_program() {
    let mut h = two_stage();
    h.start(1, Some(1));
    h.command(CoreCommand::Advance).unwrap();

    assert_eq!(h.core.state(), StateId::Idle);
    assert_eq!(h.core.run_state().stage_index, 0);
    assert!(!h.core.run_state().is_running);
    assert!(h.sink.any(|e| matches!(e, CoreEvent::ProgramCompleted { program_id: 1, .. })));
    assert!(h.core.run_state().actual_stage_end[1].is_some());
}

#[test]
fn back_at_first_stage_stays_put() {
    let mut h = two_stage();
    h.start(1, None);
    h.command(CoreCommand::Back).unwrap();
    assert_eq!(h.core.run_state().stage_index, 0);
    assert_eq!(h.core.state(), StateId::Running);

    h.command(CoreCommand::Advance).unwrap();
    assert_eq!(h.core.run_state().stage_index, 1);
    h.command(CoreCommand::Back).unwrap();
    assert_eq!(h.core.run_state().stage_index, 0);
}

#[test]
fn navigation_requires_running() {
    let mut h = two_stage();
    assert_eq!(
        h.command(CoreCommand::Advance),
        Err(Error::Command(CommandFault::NotRunning))
    );
    assert_eq!(
        h.command(CoreCommand::Pause),
        Err(Error::Command(CommandFault::NotRunning))
    );
    assert_eq!(
        h.command(CoreCommand::Resume),
        Err(Error::Command(CommandFault::NotPaused))
    );
}

#[test]
fn stage_advances_automatically_when_time_is_up() {
    let mut h = two_stage();
    h.start(1, None);
    h.run_for(599_900);
    assert_eq!(h.core.run_state().stage_index, 0);
    h.run_for(100);
    assert_eq!(h.core.run_state().stage_index, 1);
    assert!(h.hw.buzzer);
    assert!(h.sink.any(|e| matches!(
        e,
        CoreEvent::StageCompleted { stage_index: 0, elapsed_secs: 600, .. }
    )));
}

#[test]
fn duration_override_restarts_stage_timer() {
    let mut h = two_stage();
    h.start(1, None);
    h.run_for(60_000);
    assert_eq!(
        h.command(CoreCommand::OverrideStageDuration { minutes: 0 }),
        Err(Error::Config(ConfigFault::InvalidDuration))
    );
    h.command(CoreCommand::OverrideStageDuration { minutes: 2 }).unwrap();
    assert_eq!(h.core.stage_elapsed_ms(), 0);
    h.run_for(119_900);
    assert_eq!(h.core.run_state().stage_index, 0);
    h.run_for(100);
    assert_eq!(h.core.run_state().stage_index, 1);
}

// ── Pause / resume ────────────────────────────────────────────

#[test]
fn paused_time_does_not_count() {
    let mut h = two_stage();
    h.start(1, None);
    h.run_for(60_000);
    h.command(CoreCommand::Pause).unwrap();
    h.run_for(120_000);
    assert_eq!(h.core.stage_elapsed_ms(), 60_000);
    h.command(CoreCommand::Resume).unwrap();
    h.run_for(30_000);

    assert_eq!(h.core.stage_elapsed_ms(), 90_000);
    assert_eq!(
        h.core.run_state().actual_stage_start[0],
        Some(ManualClock::base())
    );
}

#[test]
fn pause_releases_heater_and_motor() {
    let mut h = Harness::new(vec![program(
        1,
        vec![Stage { target_temp_c: 60.0, ..mix_stage("Warm knead", 10, &[(60, 0)]) }],
    )]);
    h.start(1, None);
    h.tick();
    assert!(h.hw.heater);
    assert!(h.hw.motor);

    h.command(CoreCommand::Pause).unwrap();
    h.tick();
    assert!(!h.hw.heater);
    assert!(!h.hw.motor);
    assert_eq!(h.core.setpoint_c(), 0.0);
}

// ── Mixing ────────────────────────────────────────────────────

#[test]
fn motor_follows_mix_pattern() {
    let mut h = Harness::new(vec![program(1, vec![mix_stage("Knead", 10, &[(60, 10)])])]);
    h.start(1, None);
    h.tick();
    assert!(h.hw.motor);
    h.run_for(30_000);
    assert!(h.hw.motor);
    h.run_for(35_000);
    assert!(!h.hw.motor, "rest phase of the mix step");
    h.run_for(10_000);
    assert!(h.hw.motor, "pattern wrapped to its first step");
    assert!(h.sink.any(|e| *e == CoreEvent::MixCycleCompleted { stage_index: 0, cycles: 1 }));
}

#[test]
fn rest_stage_keeps_motor_off() {
    let mut h = Harness::new(vec![program(1, vec![stage("Rest", 10, 0.0)])]);
    h.start(1, None);
    h.run_for(5_000);
    assert!(!h.hw.motor);
}

// ── Heating and safety ────────────────────────────────────────

#[test]
fn heater_drives_toward_stage_target() {
    let mut h = two_stage();
    h.start(1, Some(1));
    h.tick();
    assert!(h.hw.heater);
    assert_eq!(h.core.setpoint_c(), 190.0);
    assert!(h.sink.any(|e| *e == CoreEvent::TargetChanged { setpoint_c: 190.0 }));
}

#[test]
fn emergency_temperature_pauses_and_latches() {
    let mut h = two_stage();
    h.start(1, Some(1));
    h.tick();
    assert!(h.hw.heater);

    h.hw.set_temperature(245.0);
    h.run_for(500);
    assert!(h.core.safety().emergency_shutdown());
    assert_eq!(h.core.state(), StateId::Paused);
    assert!(!h.hw.heater);
    assert!(!h.hw.motor);
    assert_eq!(
        h.sink.count(|e| matches!(e, CoreEvent::EmergencyShutdown { .. })),
        1
    );

    // Cooling down and resuming does not re-enable the heater.
    h.hw.set_temperature(25.0);
    h.run_for(30_000);
    h.command(CoreCommand::Resume).unwrap();
    let changes_before = h.hw.changes.len();
    h.run_for(30_000);
    assert!(!h.hw.changes[changes_before..].contains(&ActuatorCall::Heater(true)));
    assert_eq!(
        h.sink.count(|e| matches!(e, CoreEvent::EmergencyShutdown { .. })),
        1
    );

    // Only disabling safety clears the latch.
    h.command(CoreCommand::SetSafetyEnabled(false)).unwrap();
    h.run_for(1_000);
    assert!(!h.core.safety().emergency_shutdown());
    assert!(h.hw.heater);
}

/// Step the harness against a simple oven: +0.2 °C/s while the heater
/// relay is on, -0.05 °C/s while it is off.
fn run_with_oven(h: &mut Harness, temp_c: &mut f32, ms: u64) {
    for _ in 0..ms / TICK_MS {
        *temp_c += if h.hw.heater { 0.02 } else { -0.005 };
        h.hw.set_temperature(*temp_c);
        h.clock.advance(TICK_MS);
        h.tick();
    }
}

#[test]
fn holding_near_target_is_not_a_heater_failure() {
    let mut h = Harness::new(vec![program(1, vec![stage("Proof", 60, 30.0)])]);
    let mut temp = 29.5;
    h.hw.set_temperature(temp);
    h.start(1, None);

    run_with_oven(&mut h, &mut temp, 59 * 60_000);
    assert_eq!(h.core.state(), StateId::Running);
    assert!(!h.core.safety().emergency_shutdown());
    assert!(h.hw.heater_switched_on());
    assert!(temp > 20.0 && temp < 45.0, "oven at {temp}");
}

#[test]
fn dead_heater_trips_after_sustained_ineffectiveness() {
    let mut h = two_stage();
    h.start(1, Some(1));

    // Relay stays on at a flat 25 °C; the first failed check lands about
    // 30 s in and the shutdown five minutes after that.
    h.run_for(329_000);
    assert!(h.hw.heater);
    assert!(h.core.safety().state().ineffective_since_ms.is_some());
    assert!(!h.core.safety().emergency_shutdown());

    h.run_for(2_000);
    assert!(h.core.safety().emergency_shutdown());
    assert_eq!(h.core.state(), StateId::Paused);
    assert!(!h.hw.heater);
    assert!(h.sink.any(|e| matches!(
        e,
        CoreEvent::EmergencyShutdown { reason } if reason.starts_with("Heating ineffective")
    )));
}

#[test]
fn sensor_failures_disable_heater_without_touching_run() {
    let mut h = two_stage();
    h.start(1, Some(1));
    h.tick();
    assert!(h.hw.heater);

    h.hw.fail_reads();
    h.run_for(2_500);
    assert!(!h.core.safety().temperature_valid());
    assert!(h.core.safety().has_fault(SafetyFault::SensorInvalid));
    assert!(!h.hw.heater);
    assert_eq!(h.core.state(), StateId::Running);
    assert_eq!(h.core.run_state().stage_index, 1);
    assert!(h.sink.any(|e| matches!(e, CoreEvent::FaultDetected(_))));

    h.hw.set_temperature(25.0);
    h.run_for(1_000);
    assert!(h.core.safety().temperature_valid());
    assert!(h.hw.heater);
    assert!(h.sink.any(|e| *e == CoreEvent::FaultCleared));
}

// ── Scheduled start ───────────────────────────────────────────

#[test]
fn scheduled_start_fires_at_wall_time() {
    let mut h = two_stage();
    h.command(CoreCommand::SelectProgram(1)).unwrap();
    h.command(CoreCommand::Start {
        stage: Some(1),
        at_time: Some("07:01".into()),
    })
    .unwrap();
    assert_eq!(h.core.state(), StateId::Idle);
    assert!(h.sink.any(|e| *e
        == CoreEvent::ScheduledStartArmed {
            at: ManualClock::base() + TimeDelta::minutes(1),
            stage_index: 1
        }));
    assert_eq!(h.core.snapshot().scheduled_start_in_secs, Some(60));

    h.run_for(59_000);
    assert_eq!(h.core.state(), StateId::Idle);
    h.run_for(1_000);
    assert_eq!(h.core.state(), StateId::Running);
    assert_eq!(h.core.run_state().stage_index, 1);
}

#[test]
fn scheduled_start_rejects_bad_time() {
    let mut h = two_stage();
    h.command(CoreCommand::SelectProgram(1)).unwrap();
    assert_eq!(
        h.command(CoreCommand::Start {
            stage: None,
            at_time: Some("25:00".into()),
        }),
        Err(Error::Config(ConfigFault::InvalidTimeString))
    );
    assert!(h.core.run_state().scheduled_start.is_none());
}

#[test]
fn scheduled_start_needs_a_selected_program() {
    let mut h = two_stage();
    assert_eq!(
        h.command(CoreCommand::Start {
            stage: None,
            at_time: Some("23:00".into()),
        }),
        Err(Error::Program(ProgramFault::NoProgramSelected))
    );
    assert!(h.core.run_state().scheduled_start.is_none());
    assert!(!h.sink.any(|e| matches!(e, CoreEvent::ScheduledStartArmed { .. })));
}

#[test]
fn scheduled_start_waits_out_the_boot_hold() {
    let config = SystemConfig {
        startup_delay_ms: 120_000,
        ..crate::mock_hw::test_config()
    };
    let mut h = Harness::with_config(
        config,
        vec![program(1, vec![stage("Knead", 10, 0.0), stage("Bake", 40, 190.0)])],
    );
    h.command(CoreCommand::SelectProgram(1)).unwrap();
    h.command(CoreCommand::Start {
        stage: None,
        at_time: Some("07:01".into()),
    })
    .unwrap();

    // Due at 60 s, held until 120 s after boot.
    h.run_for(60_000);
    assert_eq!(h.core.state(), StateId::Idle);
    assert!(h.core.run_state().scheduled_start.is_some());
    h.run_for(59_900);
    assert_eq!(h.core.state(), StateId::Idle);
    h.run_for(100);
    assert_eq!(h.core.state(), StateId::Running);
    assert_eq!(h.core.run_state().stage_index, 0);
}

// ── Manual mode ───────────────────────────────────────────────

#[test]
fn manual_mode_drives_outputs_directly() {
    let mut h = two_stage();
    assert_eq!(
        h.command(CoreCommand::SetOutput { output: Output::Motor, on: true }),
        Err(Error::Command(CommandFault::NotManualMode))
    );
    h.command(CoreCommand::SetManualMode(true)).unwrap();
    h.command(CoreCommand::SetOutput { output: Output::Heater, on: true }).unwrap();
    h.command(CoreCommand::SetOutput { output: Output::Motor, on: true }).unwrap();
    h.command(CoreCommand::SetOutput { output: Output::Light, on: true }).unwrap();
    h.tick();
    assert!(h.hw.heater && h.hw.motor && h.hw.light);

    h.command(CoreCommand::SetManualMode(false)).unwrap();
    h.tick();
    assert!(!h.hw.heater);
    assert!(!h.hw.motor);
    assert!(h.hw.light, "light follows the operator in every mode");
}

#[test]
fn manual_setpoint_uses_the_controller() {
    let mut h = two_stage();
    h.command(CoreCommand::SetManualMode(true)).unwrap();
    assert_eq!(
        h.command(CoreCommand::SetManualSetpoint(260.0)),
        Err(Error::Config(ConfigFault::InvalidSetpoint(260.0)))
    );
    h.command(CoreCommand::SetManualSetpoint(40.0)).unwrap();
    h.tick();
    assert_eq!(h.core.setpoint_c(), 40.0);
    assert!(h.hw.heater);
}

// ── Tuning and persistence ────────────────────────────────────

#[test]
fn settings_save_after_quiet_period() {
    let mut h = two_stage();
    let settings = MockSettings::default();
    h.command(CoreCommand::SetPid { kp: 3.0, ki: 1.0, kd: 1.0 }).unwrap();
    assert!(h.core.is_settings_dirty());

    h.run_for(1_000);
    assert!(!h.core.auto_save_if_needed(&settings));
    h.command(CoreCommand::SetAutoSwitching(false)).unwrap();
    h.run_for(4_000);
    assert!(!h.core.auto_save_if_needed(&settings), "quiet period restarts on change");
    h.run_for(1_000);
    assert!(h.core.auto_save_if_needed(&settings));
    assert_eq!(settings.saves.get(), 1);
    let stored = settings.stored.borrow().clone().unwrap();
    assert_eq!(stored.kp, 3.0);
    assert!(!stored.auto_switching);
    assert!(!h.core.is_settings_dirty());
}

#[test]
fn explicit_save_is_immediate() {
    let mut h = two_stage();
    let settings = MockSettings::default();
    h.command(CoreCommand::SetWindowSize { window_ms: 20_000 }).unwrap();
    h.command(CoreCommand::SaveSettings).unwrap();
    assert!(h.core.auto_save_if_needed(&settings));
    assert_eq!(settings.stored.borrow().as_ref().map(|c| c.window.window_ms), Some(20_000));
}

#[test]
fn invalid_tuning_is_rejected_without_side_effects() {
    let mut h = two_stage();
    let before = h.core.config().clone();
    assert!(matches!(
        h.command(CoreCommand::SetFilter { samples: 7, reject: 3, interval_ms: 500 }),
        Err(Error::Config(ConfigFault::InvalidFilterParams { .. }))
    ));
    assert_eq!(
        h.command(CoreCommand::SetWindowSize { window_ms: 6_000 }),
        Err(Error::Config(ConfigFault::WindowFloorsTooLarge))
    );
    assert_eq!(
        h.command(CoreCommand::SwitchProfile("Searing".into())),
        Err(Error::Config(ConfigFault::UnknownProfile))
    );
    assert_eq!(h.core.config(), &before);
    assert!(!h.core.is_settings_dirty());
}

#[test]
fn filter_and_profile_changes_apply() {
    let mut h = two_stage();
    h.command(CoreCommand::SetFilter { samples: 20, reject: 4, interval_ms: 250 }).unwrap();
    assert_eq!(h.core.config().temp_samples, 20);
    h.command(CoreCommand::SwitchProfile("Baking".into())).unwrap();
    assert_eq!(h.core.controller().active_profile_name(), Some("Baking"));
    assert_eq!(h.core.config().active_profile.as_deref(), Some("Baking"));
    assert!(h.sink.any(|e| *e == CoreEvent::ProfileSwitched { name: "Baking".into() }));
}

#[test]
fn calibration_points_are_managed_by_command() {
    let mut h = two_stage();
    h.command(CoreCommand::AddCalibrationPoint { raw: 1000, temperature_c: 100.0 }).unwrap();
    assert_eq!(
        h.command(CoreCommand::AddCalibrationPoint { raw: 1000, temperature_c: 90.0 }),
        Err(Error::Config(ConfigFault::DuplicateCalibrationPoint(1000)))
    );
    h.command(CoreCommand::UpdateCalibrationPoint { old_raw: 1000, raw: 1100, temperature_c: 110.0 })
        .unwrap();
    assert_eq!(
        h.command(CoreCommand::DeleteCalibrationPoint { raw: 1000 }),
        Err(Error::Config(ConfigFault::CalibrationPointNotFound(1000)))
    );
    h.command(CoreCommand::DeleteCalibrationPoint { raw: 1100 }).unwrap();
    assert_eq!(h.core.config().calibration.points().len(), 2);
    assert!(h.core.is_settings_dirty());
}

// ── Resume after power loss ───────────────────────────────────

/// Rise target sits below the 25 °C ambient so nothing heats.
fn three_stage() -> Vec<Program> {
    vec![program(
        3,
        vec![
            stage("Knead", 10, 0.0),
            ferment_stage("Rise", 60, 24.0),
            stage("Bake", 40, 190.0),
        ],
    )]
}

#[test]
fn run_survives_power_cycle() {
    let resume = MockResume::default();
    let mut h = Harness::new(three_stage());
    h.start(3, None);
    h.run_for(90_000);
    h.command(CoreCommand::Advance).unwrap();
    h.run_for(30_000);
    assert!(h.core.persist_run_if_needed(&resume));
    let saved = resume.stored.borrow().clone().unwrap();
    assert_eq!(saved.stage_index, 1);
    assert_eq!(saved.stage_elapsed_ms, 30_000);
    assert!(saved.fermentation_weighted_secs > 0.0);

    // Power cycle.
    let mut h2 = Harness::new(three_stage());
    let state = h2
        .core
        .resume_from_store(&resume, &h2.programs, &mut h2.sink);
    assert_eq!(state, Some(StateId::Running));
    assert_eq!(h2.core.run_state().stage_index, 1);
    assert_eq!(h2.core.stage_elapsed_ms(), 30_000);
    assert_eq!(
        h2.core.fermentation().weighted_elapsed_secs(),
        saved.fermentation_weighted_secs
    );
    h2.run_for(10_000);
    assert_eq!(h2.core.stage_elapsed_ms(), 40_000);

    h2.command(CoreCommand::Stop).unwrap();
    assert!(h2.core.persist_run_if_needed(&resume));
    assert!(resume.stored.borrow().is_none());
}

#[test]
fn mismatched_snapshot_is_discarded() {
    let resume = MockResume::default();
    let mut h = Harness::new(three_stage());
    h.start(3, None);
    h.core.persist_run_if_needed(&resume);
    if let Some(snapshot) = resume.stored.borrow_mut().as_mut() {
        snapshot.stage_index = 7;
    }

    let mut h2 = Harness::new(three_stage());
    assert_eq!(
        h2.core.resume_from_store(&resume, &h2.programs, &mut h2.sink),
        None
    );
    assert_eq!(h2.core.state(), StateId::Idle);
    assert!(resume.stored.borrow().is_none());
    assert_eq!(resume.clears.get(), 1);
}

#[test]
fn checkpoint_refreshes_while_running() {
    let resume = MockResume::default();
    let mut h = Harness::new(three_stage());
    h.start(3, None);
    assert!(h.core.persist_run_if_needed(&resume));
    h.run_for(1_000);
    assert!(!h.core.persist_run_if_needed(&resume));
    h.run_for(60_000);
    assert!(h.core.persist_run_if_needed(&resume));
    assert_eq!(resume.writes.get(), 2);
}

// ── Status ────────────────────────────────────────────────────

#[test]
fn snapshot_reports_forecast_while_running() {
    let mut h = Harness::new(three_stage());
    assert!(h.core.snapshot().forecast.is_none());

    h.start(3, None);
    h.run_for(60_000);
    let status = h.core.snapshot();
    assert_eq!(status.state, StateId::Running);
    assert_eq!(status.stage_label.as_deref(), Some("Knead"));
    assert_eq!(status.stage_count, 3);
    assert_eq!(status.stage_elapsed_secs, 60);
    let forecast = status.forecast.clone().unwrap();
    assert_eq!(forecast.time_left_secs, 540);
    assert_eq!(forecast.stage_ends.len(), 3);
    assert!(forecast.program_end >= forecast.stage_ends[1]);
    assert!(serde_json::to_string(&status).is_ok());
}

// ── Command queue ─────────────────────────────────────────────

#[test]
fn queued_commands_apply_between_ticks() {
    let queue: CommandQueue<4, 4> = CommandQueue::new();
    let mut h = two_stage();
    assert!(queue.submit(1, CoreCommand::SelectProgram(1)));
    assert!(queue.submit(2, CoreCommand::Start { stage: None, at_time: None }));
    assert!(queue.submit(3, CoreCommand::Resume));

    let Harness { core, clock, programs, sink, .. } = &mut h;
    let applied = queue.drain(|cmd| core.handle_command(cmd, &*clock, &*programs, &mut *sink));
    assert_eq!(applied, 3);

    let outcomes: Vec<_> = std::iter::from_fn(|| queue.try_outcome()).collect();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].result.is_ok() && outcomes[1].result.is_ok());
    assert_eq!(outcomes[2].request_id, 3);
    assert_eq!(outcomes[2].result, Err(Error::Command(CommandFault::NotPaused)));
    assert_eq!(h.core.state(), StateId::Running);
}
