// SPDX-License-Identifier: GPL-3.0-or-later

//! The foreground poller. Runs once per main-loop iteration after START:
//! scans the eight presence sensors, consumes hub edges latched by the
//! ISR, times the action button, and emits the ALIVE heartbeat.

use crate::consts::feeder::DEFAULT_RPM;
use crate::consts::filament::COUNT;
use crate::consts::host::ALIVE_INTERVAL_MS;
use crate::controller::Controller;
use crate::hal::{AudioCues, Board, Clock, Color, InputPort, LedPanel, Melody};

// Hold the button longer than this for the load-to-hub gesture.
const LONG_PRESS_MS: u32 = 1000;

impl<B: Board> Controller<B> {
    /// Scan all eight channels and react to insertions and removals.
    /// `sound` is off during the silent refresh START performs.
    pub(crate) fn poll_sensors(&mut self, sound: bool) {
        for channel in 0..COUNT {
            let present = self.machine.inputs.filament_present(channel);
            if present == self.channels.is_present(channel) {
                continue;
            }
            self.channels.set_present(channel, present);

            if present {
                self.log_info(format_args!("Filament T{} inserted", channel));

                if self.channels.is_active(channel) {
                    self.unset_missing_filament();

                    let color = if self.hub.is_stalled() { Color::Yellow } else { Color::Green };
                    self.machine.leds.set(channel, color);
                } else {
                    self.machine.leds.set(channel, Color::Cyan);
                }

                if sound {
                    self.machine.audio.play(Melody::FilamentInserted, false);
                }
            } else {
                self.log_info(format_args!("Filament T{} removed", channel));

                if self.channels.is_active(channel) {
                    self.set_missing_filament();

                    self.machine.leds.set(channel, Color::Red);

                    if sound {
                        self.machine.audio.play(Melody::Error, false);
                    }

                    self.machine.leds.blink(channel, Color::Red);
                } else {
                    self.machine.leds.set(channel, Color::Black);

                    if sound {
                        self.machine.audio.play(Melody::FilamentRemoved, false);
                    }
                }
            }
        }
    }

    /// Consume a hub edge latched by the ISR. Filament arriving at the hub
    /// while the active channel is loaded clears the runout condition.
    pub(crate) fn poll_hub(&mut self) {
        let present = self.hub.filament_present();
        if present == self.last_hub_present {
            return;
        }

        // The wire format reports the raw pin level (active low).
        self.log_info(format_args!("Hub state changed to {}", if present { 0 } else { 1 }));
        self.last_hub_present = present;

        if present && self.channels.active_present() {
            self.mark_active_channel(Color::Green);
            self.unset_missing_filament();
        }
    }

    /// Track the action button. Short press: release the selector. Long
    /// press with a loaded channel and an empty hub: feed the filament up
    /// to the hub, then release.
    pub(crate) fn poll_button(&mut self) {
        let pressed = self.machine.inputs.button_pressed();
        let now = self.machine.clock.millis();

        if pressed && self.button_press_start_ms == 0 {
            self.button_press_start_ms = now;
        }

        if !pressed && self.button_press_start_ms > 0 {
            let held_ms = now.wrapping_sub(self.button_press_start_ms);
            self.button_press_start_ms = 0;

            self.machine.audio.click();

            if held_ms > LONG_PRESS_MS {
                self.log_info(format_args!("Action button pressed long"));

                if self.channels.active_present() && !self.hub.filament_present() {
                    let channel = self.channels.active().unwrap_or(0);

                    self.auto_extruding = true;
                    let degrees = self.config.filament_positions[channel];

                    self.machine.leds.set(channel, Color::Orange);
                    self.set_selector_position(degrees);
                    self.extrude(self.config.extrude_mm, DEFAULT_RPM);
                    self.filament_release();
                    self.auto_extruding = false;
                }
            } else {
                self.log_info(format_args!("Action button pressed short"));
                self.filament_release();
            }
        }
    }

    pub(crate) fn poll_alive(&mut self) {
        let now = self.machine.clock.millis();
        if now.wrapping_sub(self.previous_alive_ms) > ALIVE_INTERVAL_MS {
            self.reply_alive();
            self.previous_alive_ms = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::hal::{Color, Melody};
    use crate::sim::Rig;

    #[test]
    fn insertion_on_a_non_active_channel_goes_cyan() {
        let mut rig = Rig::new();
        rig.start();

        rig.shared.borrow_mut().filament_present[6] = true;
        rig.controller.tick();

        let lines = rig.take_output();
        assert!(lines.iter().any(|l| l.contains("INFO - Filament T6 inserted")));
        let shared = rig.shared.borrow();
        assert_eq!(shared.led_current[6], Color::Cyan);
        assert!(shared.melodies.contains(&(Melody::FilamentInserted, false)));
    }

    #[test]
    fn removal_on_the_active_channel_raises_runout() {
        let mut rig = Rig::new();
        rig.start();
        rig.shared.borrow_mut().filament_present[2] = true;
        rig.controller.tick();
        rig.controller.select_filament(2);
        rig.take_output();

        rig.shared.borrow_mut().filament_present[2] = false;
        rig.controller.tick();

        let lines = rig.take_output();
        assert!(lines.iter().any(|l| l.contains("INFO - Filament T2 removed")));
        let shared = rig.shared.borrow();
        assert_eq!(shared.led_current[2], Color::Red);
        assert_eq!(shared.missing_signal.last(), Some(&true));
        assert!(shared.melodies.contains(&(Melody::Error, false)));
        assert!(shared.led_blinks.contains(&(2, Color::Red)));
    }

    #[test]
    fn removal_elsewhere_just_dims_the_led() {
        let mut rig = Rig::new();
        rig.start();
        {
            let mut shared = rig.shared.borrow_mut();
            shared.filament_present[1] = true;
            shared.filament_present[4] = true;
        }
        rig.controller.tick();
        rig.controller.select_filament(1);
        rig.take_output();

        rig.shared.borrow_mut().filament_present[4] = false;
        rig.controller.tick();

        let shared = rig.shared.borrow();
        assert_eq!(shared.led_current[4], Color::Black);
        // The runout line still reflects the active channel.
        assert_eq!(shared.missing_signal.last(), Some(&false));
        assert!(shared.melodies.contains(&(Melody::FilamentRemoved, false)));
    }

    #[test]
    fn hub_edge_clears_runout_for_a_loaded_channel() {
        let mut rig = Rig::new();
        rig.start();
        rig.shared.borrow_mut().filament_present[3] = true;
        rig.controller.tick();
        rig.controller.select_filament(3);
        rig.take_output();

        rig.hub_insert();
        rig.controller.tick();

        let lines = rig.take_output();
        assert!(lines.iter().any(|l| l.contains("INFO - Hub state changed to 0")));
        let shared = rig.shared.borrow();
        assert_eq!(shared.led_current[3], Color::Green);
        assert_eq!(shared.missing_signal.last(), Some(&false));
    }

    #[test]
    fn hub_edge_is_reported_once() {
        let mut rig = Rig::new();
        rig.start();
        rig.hub_insert();
        rig.controller.tick();
        rig.take_output();

        rig.controller.tick();
        assert!(rig.take_output().is_empty());
    }

    #[test]
    fn short_press_releases_the_selector() {
        let mut rig = Rig::new();
        rig.start();
        rig.controller.set_selector_position(126);

        rig.shared.borrow_mut().button = true;
        rig.controller.tick();
        {
            let mut shared = rig.shared.borrow_mut();
            shared.button = false;
            shared.now_ms += 300;
        }
        rig.controller.tick();

        let lines = rig.take_output();
        assert!(lines.iter().any(|l| l.contains("INFO - Action button pressed short")));
        let shared = rig.shared.borrow();
        assert_eq!(shared.clicks, 1);
        // Parked at channel 7's slot (the last position was high).
        assert_eq!(shared.selector_moves.last(), Some(&10));
    }

    #[test]
    fn long_press_feeds_the_active_channel_to_the_hub() {
        let mut rig = Rig::new();
        rig.start();
        rig.shared.borrow_mut().filament_present[1] = true;
        rig.controller.tick();
        rig.controller.select_filament(1);
        rig.take_output();

        // The feed only ends when the hub triggers; no stall verdict may
        // be reached even though the budget is long exceeded.
        let budget = rig.controller.config.steps_from_mm((50 + 60 + 23) as i64);
        rig.shared.borrow_mut().hub_script.push((budget + 5000, true));

        rig.shared.borrow_mut().button = true;
        rig.controller.tick();
        {
            let mut shared = rig.shared.borrow_mut();
            shared.button = false;
            shared.now_ms += 1500;
        }
        rig.controller.tick();

        let lines = rig.take_output();
        assert!(lines.iter().any(|l| l.contains("INFO - Action button pressed long")));
        let shared = rig.shared.borrow();
        assert!(shared.pulses > budget);
        assert!(!rig.controller.hub.is_stalled());
        assert!(!rig.controller.auto_extruding);
        // Feed, then release: the selector ended parked.
        assert_eq!(shared.selector_moves.last(), Some(&10));
    }

    #[test]
    fn long_press_with_filament_already_at_hub_does_nothing() {
        let mut rig = Rig::new();
        rig.start();
        rig.shared.borrow_mut().filament_present[1] = true;
        rig.controller.tick();
        rig.controller.select_filament(1);
        rig.hub_insert();
        rig.controller.tick();
        rig.take_output();
        let moves_before = rig.shared.borrow().selector_moves.len();

        rig.shared.borrow_mut().button = true;
        rig.controller.tick();
        {
            let mut shared = rig.shared.borrow_mut();
            shared.button = false;
            shared.now_ms += 1500;
        }
        rig.controller.tick();

        let shared = rig.shared.borrow();
        assert_eq!(shared.pulses, 0);
        assert_eq!(shared.selector_moves.len(), moves_before);
    }
}
