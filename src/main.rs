//! Breadmaker firmware: main entry point.
//!
//! Hexagonal architecture: one synchronous control loop owns the core and
//! applies queued commands between ticks.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter   LogEventSink   NvsStore     SystemClock     │
//! │  (RTD + relays)    (EventSink)    (Settings +  (ClockPort)     │
//! │                                    Resume)                     │
//! │  JsonProgramStore  COMMAND_QUEUE (UI / network producers)      │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              ControlCore (pure logic)                  │    │
//! │  │  Filter · Safety · FSM · PID/window · Fermentation     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::time::Duration;

use anyhow::Result;
use esp_idf_hal::adc::attenuation::DB_11;
use esp_idf_hal::adc::oneshot::config::AdcChannelConfig;
use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_hal::gpio::PinDriver;
use esp_idf_hal::peripherals::Peripherals;
use log::{error, info, warn};

use breadmaker::adapters::hardware::HardwareAdapter;
use breadmaker::adapters::log_sink::LogEventSink;
use breadmaker::adapters::nvs::NvsStore;
use breadmaker::adapters::program_store::JsonProgramStore;
use breadmaker::adapters::time::SystemClock;
use breadmaker::app::ports::ActuatorPort;
use breadmaker::app::queue::COMMAND_QUEUE;
use breadmaker::app::service::ControlCore;
use breadmaker::drivers::relay::{Polarity, RelayBank};
use breadmaker::drivers::watchdog::Watchdog;
use breadmaker::sensors::rtd::RtdSensor;

/// Factory program set.
const PROGRAMS_JSON: &str = include_str!("../data/programs.json");

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Breadmaker v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;

    // ── 2. Outputs: everything off before anything else ───────
    let relays = RelayBank::new(
        PinDriver::output(peripherals.pins.gpio5)?,
        PinDriver::output(peripherals.pins.gpio6)?,
        PinDriver::output(peripherals.pins.gpio7)?,
        PinDriver::output(peripherals.pins.gpio15)?,
        Polarity::ActiveHigh,
    );

    // ── 3. RTD on ADC1 ────────────────────────────────────────
    let adc = AdcDriver::new(peripherals.adc1)?;
    let adc_config = AdcChannelConfig {
        attenuation: DB_11,
        ..Default::default()
    };
    let mut rtd_channel = AdcChannelDriver::new(adc, peripherals.pins.gpio4, &adc_config)?;
    let rtd = RtdSensor::new(move || rtd_channel.read_raw().ok().map(i32::from));

    let mut hw = HardwareAdapter::new(rtd, relays);

    // ── 4. Storage and settings ───────────────────────────────
    let nvs = match NvsStore::new() {
        Ok(n) => n,
        Err(e) => {
            error!("NVS init failed ({}), halting with outputs off", e);
            hw.all_off();
            return Err(anyhow::anyhow!("NVS init failed: {}", e));
        }
    };
    let programs = match JsonProgramStore::from_json(PROGRAMS_JSON) {
        Ok(p) => p,
        Err(e) => {
            warn!("Factory programs unreadable ({}), starting with none", e);
            JsonProgramStore::default()
        }
    };

    let clock = SystemClock::new();
    if !clock.wall_clock_synced() {
        warn!("Wall clock not set; scheduled starts use uptime-relative time");
    }
    let mut log_sink = LogEventSink::new();

    // ── 5. Control core ───────────────────────────────────────
    let mut core = ControlCore::with_settings(&nvs);
    let loop_interval = Duration::from_millis(u64::from(core.config().control_loop_interval_ms));
    core.start(&clock, &mut log_sink);
    if let Some(state) = core.resume_from_store(&nvs, &programs, &mut log_sink) {
        info!("Resumed interrupted run in {:?}", state);
    }

    let watchdog = Watchdog::default();
    info!("System ready. Entering control loop.");

    // ── 6. Control loop ───────────────────────────────────────
    loop {
        COMMAND_QUEUE.drain(|cmd| core.handle_command(cmd, &clock, &programs, &mut log_sink));

        core.tick(&mut hw, &clock, &mut log_sink);

        // Deferred persistence: settings debounce, resume checkpoints.
        core.auto_save_if_needed(&nvs);
        core.persist_run_if_needed(&nvs);

        watchdog.feed();
        std::thread::sleep(loop_interval);
    }
}
