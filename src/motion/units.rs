// SPDX-License-Identifier: GPL-3.0-or-later

//! Millimeters, shaft degrees and microsteps. Distances travel through the
//! firmware as integer step counts; millimeters only exist at the host
//! boundary (config fields, command arguments, the travel report).

use crate::consts::feeder::{FULL_STEPS_PER_REVOLUTION, MICROSTEPS};

const STEPS_PER_REVOLUTION: u64 = (MICROSTEPS * FULL_STEPS_PER_REVOLUTION) as u64;

/// Whole shaft degrees covering `mm` of filament travel, truncated.
pub fn degrees_from_mm(mm: i64, mm_per_rotation: f64) -> i64 {
    (mm as f64 * 360.0 / mm_per_rotation) as i64
}

/// Microsteps covering `degrees` of shaft rotation, truncated.
pub fn steps_from_degrees(degrees: u32) -> u32 {
    (degrees as u64 * STEPS_PER_REVOLUTION / 360) as u32
}

/// Microsteps covering `mm` of filament travel.
///
/// A negative distance wraps to a huge budget, which the stall checks
/// treat as "never": that matches the comparison the distance budgets are
/// used in.
pub fn steps_from_mm(mm: i64, mm_per_rotation: f64) -> u32 {
    let degrees = degrees_from_mm(mm, mm_per_rotation);
    (degrees * STEPS_PER_REVOLUTION as i64 / 360) as u32
}

/// Filament travel covered by `steps`, for the post-motion report.
pub fn mm_from_steps(steps: u32, mm_per_rotation: f64) -> f64 {
    steps as f64 * 360.0 / STEPS_PER_REVOLUTION as f64 * mm_per_rotation / 360.0
}
