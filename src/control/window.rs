//! Time-proportional heater window.
//!
//! The heater relay cannot be modulated quickly, so the PID fraction is
//! turned into an on-time inside a repeating window of `W` ms:
//!
//! ```text
//!   |<────────────── W ──────────────>|
//!   |████████ on_time ████|           |
//!   ^ window start                    ^ next window
//! ```
//!
//! A window may be restarted early when the output jumps in a direction the
//! current window position cannot serve (more heat wanted after the on-time
//! already ended, or much less heat wanted while still heating).

use core::fmt::Write as _;

use heapless::String;
use log::info;
use serde::{Deserialize, Serialize};

/// Window and restart tuning.  The on-time is fixed when a window opens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowSettings {
    pub window_ms: u32,
    pub min_on_ms: u32,
    pub min_off_ms: u32,
    /// No restart before this much of the window has elapsed.
    pub restart_guard_ms: u32,
    /// Output change that qualifies for a restart.
    pub restart_threshold: f32,
    /// Output must exceed this for a "more heat" restart.
    pub restart_high_output: f32,
    /// Output must be below this for a "less heat" restart.
    pub restart_low_output: f32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            window_ms: 30_000,
            min_on_ms: 2_000,
            min_off_ms: 5_000,
            restart_guard_ms: 2_000,
            restart_threshold: 0.05,
            restart_high_output: 0.7,
            restart_low_output: 0.3,
        }
    }
}

/// Map a PID fraction to an on-time honouring both floors.
///
/// Outputs within 0.001 of either end snap to fully off/on.  Otherwise the
/// on-time is raised to `min_on` or lowered to `window - min_off`.  When the
/// floors cannot both fit inside the window the nearer of fully off/on wins.
pub fn clamp_on_time(output: f32, window_ms: u32, min_on_ms: u32, min_off_ms: u32) -> u32 {
    if output <= 0.001 {
        return 0;
    }
    if output >= 0.999 {
        return window_ms;
    }
    let raw = (output * window_ms as f32).round() as u32;
    let upper = window_ms.saturating_sub(min_off_ms);
    if min_on_ms > upper {
        return if raw * 2 < window_ms { 0 } else { window_ms };
    }
    raw.clamp(min_on_ms, upper)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RestartReason {
    MoreHeat,
    LessHeat,
}

pub struct TimeProportionalWindow {
    settings: WindowSettings,
    window_start_ms: Option<u64>,
    on_time_ms: u32,
    last_output_for_restart: f32,
    restart_count: u32,
    last_restart_reason: String<64>,
    last_restart_ms: Option<u64>,
    heater_on: bool,
}

impl TimeProportionalWindow {
    pub fn new(settings: WindowSettings) -> Self {
        Self {
            settings,
            window_start_ms: None,
            on_time_ms: 0,
            last_output_for_restart: 0.0,
            restart_count: 0,
            last_restart_reason: String::new(),
            last_restart_ms: None,
            heater_on: false,
        }
    }

    pub fn settings(&self) -> &WindowSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: WindowSettings) {
        self.settings = settings;
    }

    /// Evaluate the window for `output` at `now_ms`.  Returns the heater
    /// command.  A disabled window forces the heater off and leaves its
    /// bookkeeping alone.
    pub fn update(&mut self, now_ms: u64, output: f32, enabled: bool) -> bool {
        if !enabled {
            self.heater_on = false;
            return false;
        }

        let s = self.settings;
        let start = match self.window_start_ms {
            Some(t) => t,
            None => {
                self.open_window(now_ms, output);
                now_ms
            }
        };
        let elapsed = now_ms.saturating_sub(start);

        let mut restart = None;
        if elapsed >= u64::from(s.restart_guard_ms) && elapsed < u64::from(s.window_ms) {
            let last = self.last_output_for_restart;
            if (output - last).abs() >= s.restart_threshold {
                let past_on = elapsed >= u64::from(self.on_time_ms);
                if output > last && past_on && output > s.restart_high_output {
                    restart = Some(RestartReason::MoreHeat);
                } else if output < last && !past_on && output < s.restart_low_output {
                    restart = Some(RestartReason::LessHeat);
                }
            }
        }

        if let Some(reason) = restart {
            self.record_restart(reason, output, now_ms);
            self.open_window(now_ms, output);
        } else if elapsed >= u64::from(s.window_ms) {
            self.open_window(now_ms, output);
        }

        let in_window = now_ms.saturating_sub(self.window_start_ms.unwrap_or(now_ms));
        self.heater_on = in_window < u64::from(self.on_time_ms);
        self.heater_on
    }

    /// Forget the current window; the next enabled update opens a new one.
    pub fn reset(&mut self) {
        self.window_start_ms = None;
        self.on_time_ms = 0;
        self.heater_on = false;
    }

    pub fn heater_on(&self) -> bool {
        self.heater_on
    }

    pub fn on_time_ms(&self) -> u32 {
        self.on_time_ms
    }

    pub fn window_start_ms(&self) -> Option<u64> {
        self.window_start_ms
    }

    pub fn last_output_for_restart(&self) -> f32 {
        self.last_output_for_restart
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    pub fn last_restart_reason(&self) -> &str {
        &self.last_restart_reason
    }

    pub fn last_restart_ms(&self) -> Option<u64> {
        self.last_restart_ms
    }

    fn open_window(&mut self, now_ms: u64, output: f32) {
        let s = &self.settings;
        self.window_start_ms = Some(now_ms);
        self.last_output_for_restart = output;
        self.on_time_ms = clamp_on_time(output, s.window_ms, s.min_on_ms, s.min_off_ms);
    }

    fn record_restart(&mut self, reason: RestartReason, output: f32, now_ms: u64) {
        self.restart_count = self.restart_count.saturating_add(1);
        self.last_restart_ms = Some(now_ms);
        self.last_restart_reason.clear();
        let pct = output * 100.0;
        // 64 bytes always fits either message.
        let _ = match reason {
            RestartReason::MoreHeat => write!(
                self.last_restart_reason,
                "Need more heat (output increased to {pct:.1}%)"
            ),
            RestartReason::LessHeat => write!(
                self.last_restart_reason,
                "Reduce heat (output decreased to {pct:.1}%)"
            ),
        };
        info!(
            "Window restart #{}: {}",
            self.restart_count, self.last_restart_reason
        );
    }
}
