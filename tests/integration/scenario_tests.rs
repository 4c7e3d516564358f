//! End-to-end scenarios: whole programs run against the mock clock, plus
//! the numeric building blocks they depend on.

use breadmaker::app::commands::CoreCommand;
use breadmaker::app::events::CoreEvent;
use breadmaker::control::window::{TimeProportionalWindow, WindowSettings, clamp_on_time};
use breadmaker::error::{ConfigFault, SafetyFault};
use breadmaker::fsm::StateId;
use breadmaker::safety::{SafetyLimits, SafetyMonitor};
use breadmaker::sensors::calibration::{CalibrationPoint, CalibrationTable};

use crate::mock_hw::{Harness, ferment_stage, program, stage};

// ── Fermentation stage completes faster when warm ─────────────

#[test]
fn warm_fermentation_finishes_in_half_the_time() {
    // 30 °C against a 20 °C baseline with Q10 2: factor 0.5.
    let mut h = Harness::new(vec![program(
        1,
        vec![stage("Mix", 10, 20.0), ferment_stage("Rise", 10, 20.0)],
    )]);
    h.hw.set_temperature(30.0);
    h.start(1, None);

    h.run_for(600_000);
    assert_eq!(h.core.run_state().stage_index, 1);
    assert!(h.core.fermentation().is_active());
    assert!((h.core.fermentation().factor() - 0.5).abs() < 1e-4);

    h.run_for(299_000);
    assert_eq!(h.core.state(), StateId::Running);
    assert_eq!(h.core.run_state().stage_index, 1);

    h.run_for(2_000);
    assert_eq!(h.core.state(), StateId::Idle);
    assert!(h.sink.any(|e| matches!(e, CoreEvent::ProgramCompleted { program_id: 1, .. })));
    assert!(!h.hw.heater_switched_on(), "stage targets sit below ambient");
}

#[test]
fn cool_fermentation_is_stretched() {
    // 10 °C: factor 2, so ten planned minutes take twenty.
    let mut h = Harness::new(vec![program(1, vec![ferment_stage("Cold rise", 10, 0.0)])]);
    h.hw.set_temperature(10.0);
    h.tick();
    h.start(1, None);

    h.run_for(1_190_000);
    assert_eq!(h.core.state(), StateId::Running);
    let weighted = h.core.fermentation().weighted_elapsed_secs();
    assert!((weighted - 595.0).abs() < 1.0, "weighted {weighted}");

    h.run_for(12_000);
    assert_eq!(h.core.state(), StateId::Idle);
}

// ── Calibration interpolation ─────────────────────────────────

#[test]
fn two_point_table_interpolates_and_clamps() {
    let table = CalibrationTable::from_points(&[
        CalibrationPoint { raw: 100, temperature_c: 0.0 },
        CalibrationPoint { raw: 200, temperature_c: 100.0 },
    ])
    .unwrap();
    assert_eq!(table.calibrate(150), 50.0);
    assert_eq!(table.calibrate(50), 0.0);
    assert_eq!(table.calibrate(250), 100.0);
}

#[test]
fn calibration_change_moves_the_reading() {
    let mut h = Harness::new(vec![program(1, vec![stage("Rest", 10, 0.0)])]);
    h.tick();
    assert!((h.core.temperature_c() - 25.0).abs() < 0.01);

    // Shift the top point so raw 250 reads 35 °C.
    h.command(CoreCommand::UpdateCalibrationPoint {
        old_raw: 4000,
        raw: 250,
        temperature_c: 35.0,
    })
    .unwrap();
    h.run_for(500);
    assert!((h.core.temperature_c() - 35.0).abs() < 0.01);
}

// ── Time-proportional window ──────────────────────────────────

#[test]
fn half_output_holds_heater_for_half_the_window() {
    assert_eq!(clamp_on_time(0.5, 30_000, 2_000, 5_000), 15_000);

    let mut window = TimeProportionalWindow::new(WindowSettings::default());
    assert!(window.update(0, 0.5, true));
    assert_eq!(window.on_time_ms(), 15_000);
    assert!(window.update(14_999, 0.5, true));
    assert!(!window.update(15_000, 0.5, true));
    assert!(!window.update(29_999, 0.5, true));
    // Next window opens with the same split.
    assert!(window.update(30_000, 0.5, true));
    assert_eq!(window.window_start_ms(), Some(30_000));
}

#[test]
fn floors_bound_small_and_large_outputs() {
    assert_eq!(clamp_on_time(0.02, 30_000, 2_000, 5_000), 2_000);
    assert_eq!(clamp_on_time(0.95, 30_000, 2_000, 5_000), 25_000);
    assert_eq!(clamp_on_time(0.0, 30_000, 2_000, 5_000), 0);
    assert_eq!(clamp_on_time(1.0, 30_000, 2_000, 5_000), 30_000);
}

// ── Sensor failure streaks ────────────────────────────────────

#[test]
fn five_failed_reads_invalidate_temperature() {
    let mut monitor = SafetyMonitor::new(SafetyLimits::default());
    for _ in 0..4 {
        assert!(monitor.record_reading(f32::NAN));
    }
    assert!(!monitor.record_reading(f32::NAN));
    assert!(monitor.has_fault(SafetyFault::SensorInvalid));
    assert!(!monitor.controller_enabled());

    assert!(monitor.record_reading(22.0));
    assert_eq!(monitor.faults() & SafetyFault::SensorInvalid.mask(), 0);
}

#[test]
fn three_zero_readings_invalidate_temperature() {
    let mut monitor = SafetyMonitor::new(SafetyLimits::default());
    assert!(monitor.record_reading(0.0));
    assert!(monitor.record_reading(0.0));
    assert!(!monitor.record_reading(0.0));
    assert!(monitor.has_fault(SafetyFault::SensorZero));
}

#[test]
fn failed_adc_reads_count_per_sample_interval() {
    let mut h = Harness::new(vec![program(1, vec![stage("Rest", 10, 0.0)])]);
    h.hw.fail_reads();

    // Reads at 100, 600, 1100 and 1600 ms.
    h.run_for(1_600);
    assert_eq!(h.hw.reads, 4);
    assert!(h.core.safety().temperature_valid());

    h.run_for(500);
    assert_eq!(h.hw.reads, 5);
    assert!(!h.core.safety().temperature_valid());
    assert!(h.sink.any(|e| matches!(
        e,
        CoreEvent::FaultDetected(mask) if mask & SafetyFault::SensorInvalid.mask() != 0
    )));
}

#[test]
fn scripted_dropouts_shorter_than_the_streak_are_tolerated() {
    let mut h = Harness::new(vec![program(1, vec![stage("Bake", 30, 180.0)])]);
    h.hw.script.extend([None, None, None, Some(250), None, None]);
    h.start(1, None);
    h.run_for(3_500);
    assert!(h.core.safety().temperature_valid());
    assert_eq!(h.core.fault_flags() & SafetyFault::SensorInvalid.mask(), 0);
}

// ── Settings surviving a restart ──────────────────────────────

#[test]
fn tuned_settings_reload_through_the_store() {
    use crate::mock_hw::{MockSettings, test_config};
    use breadmaker::app::service::ControlCore;

    let settings = MockSettings::default();
    *settings.stored.borrow_mut() = Some(test_config());

    let mut h = Harness::new(Vec::new());
    h.command(CoreCommand::SetPid { kp: 4.0, ki: 0.5, kd: 2.0 }).unwrap();
    h.command(CoreCommand::SaveSettings).unwrap();
    assert!(h.core.auto_save_if_needed(&settings));

    let reloaded = ControlCore::with_settings(&settings);
    assert_eq!(reloaded.config().kp, 4.0);
    assert_eq!(reloaded.config().kd, 2.0);

    // A stored set that fails validation falls back to defaults.
    if let Some(config) = settings.stored.borrow_mut().as_mut() {
        config.temp_samples = 3;
    }
    let fallback = ControlCore::with_settings(&settings);
    assert_eq!(fallback.config().temp_samples, 10);
    assert!(matches!(
        settings.stored.borrow().as_ref().map(|c| c.validate()),
        Some(Err(ConfigFault::InvalidFilterParams { .. }))
    ));
}
