//! Oven RTD front-end.
//!
//! The probe sits in a divider read by a oneshot ADC channel.  The driver
//! only delivers raw counts; conversion to °C is the calibration table's job.
//!
//! The ADC read is injected as a closure so the same driver serves the
//! ESP-IDF oneshot channel and host-side simulation.

use core::sync::atomic::{AtomicI32, Ordering};

use crate::app::ports::SensorPort;
use crate::error::SensorError;

/// Shared raw value for host simulation and bench testing.
static SIM_RTD_RAW: AtomicI32 = AtomicI32::new(0);

/// Inject the raw reading returned by [`simulated_reader`].
pub fn sim_set_raw(raw: i32) {
    SIM_RTD_RAW.store(raw, Ordering::Relaxed);
}

/// A reader backed by the simulation cell.
pub fn simulated_reader() -> impl FnMut() -> Option<i32> {
    || Some(SIM_RTD_RAW.load(Ordering::Relaxed))
}

pub struct RtdSensor<R>
where
    R: FnMut() -> Option<i32>,
{
    read: R,
    consecutive_failures: u32,
}

impl<R> RtdSensor<R>
where
    R: FnMut() -> Option<i32>,
{
    pub fn new(read: R) -> Self {
        Self {
            read,
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

impl<R> SensorPort for RtdSensor<R>
where
    R: FnMut() -> Option<i32>,
{
    fn read_raw_adc(&mut self) -> Result<i32, SensorError> {
        match (self.read)() {
            Some(raw) => {
                self.consecutive_failures = 0;
                Ok(raw)
            }
            None => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures == 1 {
                    log::warn!("RTD: ADC read failed");
                }
                Err(SensorError::AdcReadFailed)
            }
        }
    }
}
