// SPDX-License-Identifier: GPL-3.0-or-later

use core::sync::atomic::{AtomicBool, Ordering};

/// Hub sensor state shared between the edge ISR and the main loop.
///
/// The ISR stores on every pin edge; the loop (and the motion inner loops)
/// only ever read snapshots and compare against a locally held last value,
/// so a missed edge collapses into a single observed one. Single-byte
/// atomics are enough on a single core; acquire/release keeps the pair
/// ordered on targets that reorder.
pub struct HubLatch {
    present: AtomicBool,
    stalled: AtomicBool,
}

impl HubLatch {
    pub const fn new() -> Self {
        Self {
            present: AtomicBool::new(false),
            stalled: AtomicBool::new(false),
        }
    }

    /// Called from the hub pin edge ISR with the freshly sampled state.
    /// Any observed edge proves the sensor is alive, so the stall flag
    /// drops here too.
    pub fn isr_update(&self, present: bool) {
        self.present.store(present, Ordering::Release);
        self.stalled.store(false, Ordering::Release);
    }

    pub fn filament_present(&self) -> bool {
        self.present.load(Ordering::Acquire)
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::Acquire)
    }

    pub fn set_stalled(&self) {
        self.stalled.store(true, Ordering::Release);
    }

    pub fn clear_stalled(&self) {
        self.stalled.store(false, Ordering::Release);
    }
}

impl Default for HubLatch {
    fn default() -> Self {
        Self::new()
    }
}
