//! Raw-ADC → temperature calibration table.
//!
//! A short list of `(raw, temperature)` pairs kept sorted by `raw`.  Lookups
//! interpolate linearly between the bracketing pair and clamp to the end
//! points outside the table.  The table is only ever changed by explicit
//! add/update/delete commands.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigFault;

/// Maximum number of calibration points.
pub const MAX_CALIBRATION_POINTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub raw: i32,
    pub temperature_c: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    points: Vec<CalibrationPoint, MAX_CALIBRATION_POINTS>,
}

impl CalibrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from arbitrary points.  Duplicates are rejected.
    pub fn from_points(points: &[CalibrationPoint]) -> Result<Self, ConfigFault> {
        let mut table = Self::new();
        for p in points {
            table.add_point(p.raw, p.temperature_c)?;
        }
        Ok(table)
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Convert a raw reading to °C.  Returns `0.0` for an empty table.
    pub fn calibrate(&self, raw: i32) -> f32 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return 0.0;
        };
        if raw <= first.raw {
            return first.temperature_c;
        }
        if raw >= last.raw {
            return last.temperature_c;
        }

        for pair in self.points.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if raw >= lo.raw && raw <= hi.raw {
                // Widened so extreme raw values cannot overflow.
                let span = (i64::from(hi.raw) - i64::from(lo.raw)) as f64;
                let frac = (i64::from(raw) - i64::from(lo.raw)) as f64 / span;
                return lo.temperature_c
                    + (frac * f64::from(hi.temperature_c - lo.temperature_c)) as f32;
            }
        }
        last.temperature_c
    }

    pub fn add_point(&mut self, raw: i32, temperature_c: f32) -> Result<(), ConfigFault> {
        if self.points.iter().any(|p| p.raw == raw) {
            return Err(ConfigFault::DuplicateCalibrationPoint(raw));
        }
        self.points
            .push(CalibrationPoint { raw, temperature_c })
            .map_err(|_| ConfigFault::CalibrationTableFull)?;
        self.sort();
        Ok(())
    }

    /// Replace the point at `old_raw`.  Moving it onto another point's raw
    /// value is rejected.
    pub fn update_point(
        &mut self,
        old_raw: i32,
        raw: i32,
        temperature_c: f32,
    ) -> Result<(), ConfigFault> {
        if raw != old_raw && self.points.iter().any(|p| p.raw == raw) {
            return Err(ConfigFault::DuplicateCalibrationPoint(raw));
        }
        let point = self
            .points
            .iter_mut()
            .find(|p| p.raw == old_raw)
            .ok_or(ConfigFault::CalibrationPointNotFound(old_raw))?;
        *point = CalibrationPoint { raw, temperature_c };
        self.sort();
        Ok(())
    }

    pub fn delete_point(&mut self, raw: i32) -> Result<(), ConfigFault> {
        let idx = self
            .points
            .iter()
            .position(|p| p.raw == raw)
            .ok_or(ConfigFault::CalibrationPointNotFound(raw))?;
        self.points.remove(idx);
        Ok(())
    }

    fn sort(&mut self) {
        self.points.sort_unstable_by_key(|p| p.raw);
    }
}
