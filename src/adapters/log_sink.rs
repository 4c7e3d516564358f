//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing one structured line per core event
//! to the logger (UART / USB-CDC in production).  An activity-log or
//! display adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::CoreEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`CoreEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &CoreEvent) {
        match event {
            CoreEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            CoreEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            CoreEvent::ProgramSelected { program_id, name } => {
                info!("PROGRAM | selected #{} '{}'", program_id, name);
            }
            CoreEvent::ProgramStarted {
                program_id,
                name,
                stage_index,
            } => {
                info!(
                    "PROGRAM | started #{} '{}' at stage {}",
                    program_id, name, stage_index
                );
            }
            CoreEvent::ProgramStopped { program_id } => {
                info!("PROGRAM | stopped {:?}", program_id);
            }
            CoreEvent::ProgramCompleted { program_id, name } => {
                info!("PROGRAM | completed #{} '{}'", program_id, name);
            }
            CoreEvent::StageStarted {
                stage_index,
                label,
                target_temp_c,
                fermentation,
            } => {
                info!(
                    "STAGE | {} '{}' started, target={:.1}\u{00b0}C{}",
                    stage_index,
                    label,
                    target_temp_c,
                    if *fermentation { " (fermentation)" } else { "" }
                );
            }
            CoreEvent::StageCompleted {
                stage_index,
                label,
                elapsed_secs,
            } => {
                info!(
                    "STAGE | {} '{}' completed after {} s",
                    stage_index, label, elapsed_secs
                );
            }
            CoreEvent::MixStepAdvanced {
                stage_index,
                mix_index,
            } => {
                info!("MIX | stage {} step {}", stage_index, mix_index);
            }
            CoreEvent::MixCycleCompleted {
                stage_index,
                cycles,
            } => {
                info!("MIX | stage {} pattern cycle {}", stage_index, cycles);
            }
            CoreEvent::FermentationProgress {
                stage_index,
                temp_c,
                factor,
                weighted_elapsed_secs,
                planned_secs,
            } => {
                info!(
                    "FERMENT | stage {} T={:.1}\u{00b0}C factor={:.2} progress={:.0}/{} s",
                    stage_index, temp_c, factor, weighted_elapsed_secs, planned_secs
                );
            }
            CoreEvent::ScheduledStartArmed { at, stage_index } => {
                info!("SCHEDULE | start at {} from stage {}", at, stage_index);
            }
            CoreEvent::TargetChanged { setpoint_c } => {
                info!("TARGET | {:.1}\u{00b0}C", setpoint_c);
            }
            CoreEvent::ProfileSwitched { name } => {
                info!("PID | profile '{}'", name);
            }
            CoreEvent::FaultDetected(flags) => {
                warn!("FAULT | detected, flags=0b{:08b}", flags);
            }
            CoreEvent::FaultCleared => {
                info!("FAULT | all cleared");
            }
            CoreEvent::EmergencyShutdown { reason } => {
                warn!("EMERGENCY | {}", reason);
            }
        }
    }
}
