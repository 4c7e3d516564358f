//! Clock adapter.
//!
//! - **`target_os = "espidf"`** wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic).
//! - **`not(target_os = "espidf")`** uses `std::time::Instant` for
//!   host-side testing and simulation.
//!
//! Wall-clock time comes from `chrono::Local` on both; on the device it is
//! whatever SNTP or the RTC last set.

use chrono::{Local, NaiveDateTime};

use crate::app::ports::ClockPort;

pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// `false` until the wall clock has been set (e.g. before SNTP sync).
    pub fn wall_clock_synced(&self) -> bool {
        // Anything before 2020-01-01 is an unset RTC.
        const EPOCH_2020: i64 = 1_577_836_800;
        Local::now().timestamp() >= EPOCH_2020
    }
}

impl ClockPort for SystemClock {
    fn monotonic_ms(&self) -> u64 {
        self.uptime_us() / 1000
    }

    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn monotonic_us(&self) -> u64 {
        self.uptime_us()
    }
}
