// SPDX-License-Identifier: GPL-3.0-or-later

//! Tool change: pointing the selector servo at a channel, verifying the
//! filament is actually there, and parking the selector between swaps.

use crate::consts::filament::{COUNT, RELEASE_PARK_THRESHOLD_DEGREES};
use crate::controller::Controller;
use crate::hal::{AudioCues, Board, Color, LedPanel, Melody, RunoutSignal};

impl<B: Board> Controller<B> {
    /// Select `channel` for feeding. Returns false when its filament is
    /// missing; the selection sticks either way, so follow-up feed
    /// commands stay addressed to the channel the host asked for.
    pub fn select_filament(&mut self, channel: usize) -> bool {
        self.channels.set_active(channel);

        for i in 0..COUNT {
            let color = if self.channels.is_present(i) { Color::Cyan } else { Color::Black };
            self.machine.leds.set(i, color);
        }
        self.machine.leds.set(channel, Color::Orange);

        let degrees = self.config.filament_positions[channel];
        self.set_selector_position(degrees);

        if self.channels.is_present(channel) {
            self.unset_missing_filament();

            // A stall left over from an earlier motion stays visible
            // until the hub proves itself again.
            let color = if self.hub.is_stalled() { Color::Yellow } else { Color::Green };
            self.machine.leds.set(channel, color);

            true
        } else {
            self.set_missing_filament();
            self.machine.leds.set(channel, Color::Red);

            self.machine.audio.play(Melody::Error, false);
            self.machine.leds.blink(channel, Color::Red);

            false
        }
    }

    /// Park the selector outside any filament slot, on whichever end is
    /// closer to where it last stopped.
    pub fn filament_release(&mut self) {
        self.machine.leds.save();

        let channel = if self.last_selector_degrees > RELEASE_PARK_THRESHOLD_DEGREES {
            COUNT - 1
        } else {
            0
        };

        self.machine.leds.set(channel, Color::Orange);
        let degrees = self.config.filament_positions[channel];
        self.set_selector_position(degrees);

        self.machine.leds.restore();
    }

    /// End-of-swap verdict for the host: a pending hub stall turns the
    /// swap into a failure and raises the runout line.
    pub fn swap_finish(&mut self) -> bool {
        if self.hub.is_stalled() {
            self.set_missing_filament();
            self.machine.audio.play(Melody::Error, false);
            return false;
        }

        true
    }

    pub(crate) fn set_missing_filament(&mut self) {
        self.log_info(format_args!("Setting missing filament, pausing print"));
        self.machine.runout.set_missing(true);
    }

    pub(crate) fn unset_missing_filament(&mut self) {
        self.machine.runout.set_missing(false);
    }
}
