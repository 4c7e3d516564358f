//! Trimmed weighted-mean temperature filter.
//!
//! Calibrated samples are collected into a ring at a fixed interval.  Once
//! the ring has filled, every new sample produces a smoothed value:
//!
//! ```text
//!   ring ──sort──▶ [lo..lo | kept values | hi..hi]
//!                    R dropped             R dropped
//!   kept values weighted 0.5 ──────────────▶ 1.0
//! ```
//!
//! Until the first fill the most recent calibrated sample is returned as-is.

use heapless::Deque;
use log::debug;

use super::calibration::CalibrationTable;
use crate::error::ConfigFault;

/// Ring capacity upper bound.
pub const MAX_SAMPLES: usize = 50;
/// Ring capacity lower bound.
pub const MIN_SAMPLES: usize = 5;
/// Most samples that may be rejected from each end.
pub const MAX_REJECT: usize = 10;
/// Fewest samples left after rejection.
pub const MIN_EFFECTIVE_SAMPLES: usize = 3;

/// Validate a sample-count / reject-count pair.
pub fn validate_params(samples: usize, reject: usize) -> Result<(), ConfigFault> {
    let in_range = (MIN_SAMPLES..=MAX_SAMPLES).contains(&samples) && reject <= MAX_REJECT;
    if !in_range || samples < 2 * reject + MIN_EFFECTIVE_SAMPLES {
        return Err(ConfigFault::InvalidFilterParams { samples, reject });
    }
    Ok(())
}

pub struct TemperatureFilter {
    ring: Deque<f32, MAX_SAMPLES>,
    capacity: usize,
    reject: usize,
    interval_ms: u32,
    /// Set once the ring has been full; smoothing stays on afterwards.
    filled: bool,
    last_sample_ms: Option<u64>,
    last_raw_c: f32,
    output_c: f32,
}

impl TemperatureFilter {
    /// `samples` is clamped into `MIN_SAMPLES..=MAX_SAMPLES`.
    pub fn new(samples: usize, reject: usize, interval_ms: u32) -> Self {
        Self {
            ring: Deque::new(),
            capacity: samples.clamp(MIN_SAMPLES, MAX_SAMPLES),
            reject,
            interval_ms,
            filled: false,
            last_sample_ms: None,
            last_raw_c: 0.0,
            output_c: 0.0,
        }
    }

    /// True when a new sample should be collected at `now_ms`.
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.last_sample_ms
            .is_none_or(|t| now_ms.saturating_sub(t) >= u64::from(self.interval_ms))
    }

    /// Calibrate and collect `raw` if a collection is due; always returns the
    /// current filtered temperature.
    pub fn filter_sample(&mut self, raw: i32, now_ms: u64, table: &CalibrationTable) -> f32 {
        if self.is_due(now_ms) {
            self.push(table.calibrate(raw), now_ms);
        }
        self.output_c
    }

    /// Count a collection slot as used without a sample (failed read).
    pub fn mark_missed(&mut self, now_ms: u64) {
        self.last_sample_ms = Some(now_ms);
    }

    /// Append an already-calibrated sample and recompute the output.
    pub fn push(&mut self, temperature_c: f32, now_ms: u64) -> f32 {
        self.last_sample_ms = Some(now_ms);
        self.last_raw_c = temperature_c;

        if self.ring.len() >= self.capacity {
            self.ring.pop_front();
        }
        // Capacity is bounded by MAX_SAMPLES so this cannot fail.
        let _ = self.ring.push_back(temperature_c);
        if self.ring.len() >= self.capacity {
            self.filled = true;
        }

        self.output_c = if self.filled {
            self.trimmed_weighted_mean()
        } else {
            temperature_c
        };
        self.output_c
    }

    /// Change sample count, reject count and interval.  Existing samples are
    /// kept; shrinking drops the oldest.
    pub fn reconfigure(
        &mut self,
        samples: usize,
        reject: usize,
        interval_ms: u32,
    ) -> Result<(), ConfigFault> {
        validate_params(samples, reject)?;
        while self.ring.len() > samples {
            self.ring.pop_front();
        }
        if samples != self.capacity || reject != self.reject {
            debug!(
                "Filter: {} -> {} samples, reject {} -> {} ({} kept)",
                self.capacity,
                samples,
                self.reject,
                reject,
                self.ring.len()
            );
        }
        self.capacity = samples;
        self.reject = reject;
        self.interval_ms = interval_ms;
        if self.ring.len() >= self.capacity {
            self.filled = true;
        }
        Ok(())
    }

    pub fn output(&self) -> f32 {
        self.output_c
    }

    pub fn last_raw(&self) -> f32 {
        self.last_raw_c
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_smoothing(&self) -> bool {
        self.filled
    }

    fn trimmed_weighted_mean(&self) -> f32 {
        let mut sorted: heapless::Vec<f32, MAX_SAMPLES> = self.ring.iter().copied().collect();
        sorted.sort_unstable_by(f32::total_cmp);

        let n = sorted.len();
        let reject = if n >= MIN_EFFECTIVE_SAMPLES {
            self.reject.min((n - MIN_EFFECTIVE_SAMPLES) / 2)
        } else {
            0
        };
        let kept = &sorted[reject..n - reject];

        match kept.len() {
            0 => self.last_raw_c,
            1 => kept[0],
            k => {
                let step = 0.5 / (k - 1) as f32;
                let (sum, weight) = kept
                    .iter()
                    .enumerate()
                    .fold((0.0f32, 0.0f32), |(s, w), (i, v)| {
                        let wi = 0.5 + step * i as f32;
                        (s + v * wi, w + wi)
                    });
                sum / weight
            }
        }
    }
}
