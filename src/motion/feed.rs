// SPDX-License-Identifier: GPL-3.0-or-later

//! Sensor-tracked feeds. A feed has two phases: hunt for the hub sensor
//! edge under a distance budget, then travel a fixed number of
//! millimeters past it with deceleration. The two-phase shape is what
//! lands the filament tip a repeatable distance from the hub detector no
//! matter how much slack the channel had.

use super::{effective_rpm, target_half_period_us};
use crate::consts::feeder::{ACCEL_DECEL_SKIP_STEPS, SENSOR_CHECK_INTERVAL, SLOW_PULSE_DELAY_US};
use crate::controller::Controller;
use crate::hal::{AudioCues, Board, Color, Direction, FeederDriver, InputPort, LedPanel, Melody};

impl<B: Board> Controller<B> {
    /// Forward feed until the hub sees filament, then `mm` further.
    pub fn extrude(&mut self, mm: i32, rpm: u32) {
        let stall_budget_mm = self.config.mm_to_stuck + self.config.retract_mm + mm;
        self.feed_to_hub(true, mm, stall_budget_mm, Direction::Forward, rpm);
    }

    /// Reverse feed until the hub runs empty, then `mm` further back.
    pub fn retract(&mut self, mm: i32, rpm: u32) {
        let stall_budget_mm = self.config.extrude_mm + mm;
        self.feed_to_hub(false, mm, stall_budget_mm, Direction::Reverse, rpm);
    }

    fn feed_to_hub(
        &mut self,
        target_hub_present: bool,
        mm: i32,
        stall_budget_mm: i32,
        direction: Direction,
        rpm: u32,
    ) {
        if mm == 0 {
            return;
        }

        // Target state already held before a single step: either the hub
        // detector is stuck or the filament never cleared it. Flag the
        // stall up front; the hunt loop below still runs (its distance
        // budget bounds it) so the feeder parks at a known offset.
        if self.hub.filament_present() == target_hub_present {
            self.hub.set_stalled();
            self.mark_active_channel(Color::Yellow);
            self.log_warn(format_args!("Hub sensor stucked or missing"));
        }

        self.machine.feeder.enable();
        self.machine.feeder.set_direction(direction);

        let rpm = effective_rpm(rpm);
        let stall_budget_steps = self.config.steps_from_mm(stall_budget_mm as i64);
        let min_retract_steps = self.config.steps_from_mm(self.config.min_retract_mm as i64);

        let mm = if direction == Direction::Reverse { -mm } else { mm };

        let target_delay = target_half_period_us(rpm);
        let mut current_delay = SLOW_PULSE_DELAY_US;
        let mut skip_count: u32 = 0;
        let mut check_count: u32 = 0;
        let mut steps: u32 = 0;

        while self.hub.filament_present() != target_hub_present
            || self.hub.is_stalled()
            || (direction == Direction::Reverse && steps < min_retract_steps)
        {
            if skip_count > ACCEL_DECEL_SKIP_STEPS && current_delay != target_delay {
                skip_count = 0;
                current_delay -= 1;

                if current_delay < target_delay {
                    current_delay = target_delay;
                }
            }

            if direction == Direction::Reverse
                && steps > stall_budget_steps
                && steps > min_retract_steps
            {
                self.hub.set_stalled();
                self.mark_active_channel(Color::Yellow);
                self.log_warn(format_args!("Hub sensor stucked or missing on retract"));
                break;
            } else if direction == Direction::Forward
                && steps > stall_budget_steps
                && !self.auto_extruding
            {
                self.hub.set_stalled();
                self.mark_active_channel(Color::Yellow);
                self.log_warn(format_args!("Hub sensor stucked or missing on extrude"));
                break;
            }

            if check_count > SENSOR_CHECK_INTERVAL {
                check_count = 0;

                if let Some(active) = self.channels.active() {
                    if !self.machine.inputs.filament_present(active) {
                        // The filament we are pushing vanished upstream.
                        // Stop dead and raise the runout line; the host
                        // pauses the print.
                        self.machine.feeder.disable();
                        self.log_info(format_args!("Filament T{} removed", active));

                        self.set_missing_filament();

                        self.machine.leds.set(active, Color::Red);
                        self.machine.audio.play(Melody::Error, false);
                        self.machine.leds.blink(active, Color::Red);

                        return;
                    }
                }
            }

            self.machine.feeder.pulse(current_delay);

            check_count += 1;
            skip_count += 1;
            steps += 1;
        }

        let mut total_steps = steps;
        if !self.hub.is_stalled() {
            let degrees = self.config.degrees_from_mm(mm as i64);
            // On a retract the hub edge re-arms the countdown, parking the
            // tip exactly `mm` behind the sensor.
            let reset_on_hub_edge = direction == Direction::Reverse;
            total_steps += self.rotate_feeder(degrees as i32, rpm, false, true, reset_on_hub_edge);
        }

        let travelled_mm = self.config.mm_from_steps(total_steps) as i64;
        match direction {
            Direction::Forward => {
                self.log_info(format_args!("Extruded milimeters: {}", travelled_mm))
            }
            Direction::Reverse => {
                self.log_info(format_args!("Retracted milimeters: {}", travelled_mm))
            }
        }

        self.machine.feeder.disable();
    }

    pub(crate) fn mark_active_channel(&mut self, color: Color) {
        if let Some(active) = self.channels.active() {
            self.machine.leds.set(active, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::consts::feeder::{DEFAULT_RPM, SENSOR_CHECK_INTERVAL};
    use crate::hal::{Color, Direction, Melody};
    use crate::sim::Rig;

    fn steps_from_mm(rig: &Rig, mm: i64) -> u32 {
        rig.controller.config.steps_from_mm(mm)
    }

    #[test]
    fn zero_millimeters_is_a_no_op() {
        let mut rig = Rig::new();
        rig.controller.extrude(0, 500);
        assert!(rig.shared.borrow().pulse_delays.is_empty());
    }

    #[test]
    fn extrude_hunts_to_the_hub_then_overshoots() {
        let mut rig = Rig::new();
        rig.select_present_channel(3);
        let hunt = 5000;
        rig.shared.borrow_mut().hub_script.push((hunt, true));

        rig.controller.extrude(100, 500);

        let expected_overshoot =
            crate::motion::units::steps_from_degrees(rig.controller.config.degrees_from_mm(100) as u32);
        let shared = rig.shared.borrow();
        assert_eq!(shared.pulses, hunt + expected_overshoot);
        assert!(!shared.enabled);
        assert!(!rig.controller.hub.is_stalled());
        drop(shared);

        let lines = rig.take_output();
        assert!(lines.iter().any(|l| l.contains("INFO - Extruded milimeters: ")));
    }

    #[test]
    fn retract_respects_the_min_retract_floor() {
        let mut rig = Rig::new();
        rig.select_present_channel(0);
        // Hub already empty: the target state is held at entry, so this
        // is the stall-at-start path; the hunt still runs and is bounded
        // by the distance budget.
        rig.controller.retract(50, 500);

        assert!(rig.controller.hub.is_stalled());
        let budget = steps_from_mm(&rig, (23 + 50) as i64);
        let floor = steps_from_mm(&rig, 70);
        // Loop breaks one step past both bounds.
        assert_eq!(rig.shared.borrow().pulses, budget.max(floor) + 1);
        let lines = rig.take_output();
        assert!(lines.iter().any(|l| l.contains("WARN - Hub sensor stucked or missing")));
        assert!(lines
            .iter()
            .any(|l| l.contains("WARN - Hub sensor stucked or missing on retract")));
    }

    #[test]
    fn retract_floor_dominates_an_early_edge() {
        let mut rig = Rig::new();
        rig.select_present_channel(2);
        rig.hub_insert();

        // Hub goes empty after 9000 steps of pull.
        rig.shared.borrow_mut().hub_script.push((9000, false));
        rig.controller.retract(30, 500);

        let expected_tail =
            crate::motion::units::steps_from_degrees((-rig.controller.config.degrees_from_mm(-30)) as u32);
        let shared = rig.shared.borrow();
        // The min_retract floor dominates the 9000-step hunt; the loop
        // exits at the floor, then the tail travel runs.
        let floor = rig.controller.config.steps_from_mm(70);
        assert_eq!(shared.pulses, floor + expected_tail);
        assert_eq!(shared.direction, Direction::Reverse);
        assert!(!rig.controller.hub.is_stalled());
    }

    #[test]
    fn retract_tail_measures_from_a_late_edge() {
        let mut rig = Rig::new();
        rig.select_present_channel(2);
        rig.hub_insert();

        // The edge lands after the min-retract floor but inside the stall
        // budget: the hunt stops right at the edge and the fixed tail
        // travel runs from there.
        let edge_at = 50_000;
        assert!(edge_at > steps_from_mm(&rig, 70));
        assert!(edge_at < steps_from_mm(&rig, (23 + 50) as i64));
        rig.shared.borrow_mut().hub_script.push((edge_at, false));

        rig.controller.retract(50, 500);

        let tail =
            crate::motion::units::steps_from_degrees((-rig.controller.config.degrees_from_mm(-50)) as u32);
        assert_eq!(rig.shared.borrow().pulses, edge_at + tail);
        assert!(!rig.controller.hub.is_stalled());
    }

    #[test]
    fn forward_stall_sets_flag_and_yellow() {
        let mut rig = Rig::new();
        rig.select_present_channel(1);
        // Hub never reports filament.
        rig.controller.extrude(10, 500);

        assert!(rig.controller.hub.is_stalled());
        let budget = steps_from_mm(&rig, (50 + 60 + 10) as i64);
        assert_eq!(rig.shared.borrow().pulses, budget + 1);
        assert!(rig
            .shared
            .borrow()
            .led_events
            .contains(&(1, Color::Yellow)));
        assert!(!rig.shared.borrow().enabled);
        let lines = rig.take_output();
        assert!(lines
            .iter()
            .any(|l| l.contains("WARN - Hub sensor stucked or missing on extrude")));
    }

    #[test]
    fn auto_extrude_runs_without_a_stall_verdict() {
        let mut rig = Rig::new();
        rig.select_present_channel(1);
        rig.controller.auto_extruding = true;
        // Well past the normal budget, then the hub finally triggers.
        let late = steps_from_mm(&rig, (50 + 60 + 10) as i64) + 40_000;
        rig.shared.borrow_mut().hub_script.push((late, true));

        rig.controller.extrude(10, 500);

        assert!(!rig.controller.hub.is_stalled());
        assert!(rig.shared.borrow().pulses > late);
    }

    #[test]
    fn filament_loss_aborts_the_feed() {
        let mut rig = Rig::new();
        rig.select_present_channel(2);
        // Lose the filament 40mm in; the hub never triggers either, but
        // the loss must win at the next sensor-check boundary.
        let loss_at = steps_from_mm(&rig, 40);
        rig.shared.borrow_mut().sensor_script.push((loss_at, 2, false));

        rig.controller.extrude(200, DEFAULT_RPM);

        let shared = rig.shared.borrow();
        // Aborted within one check interval of the loss.
        assert!(shared.pulses <= loss_at + SENSOR_CHECK_INTERVAL + 1);
        assert!(!shared.enabled);
        assert_eq!(shared.missing_signal.last(), Some(&true));
        assert!(shared.led_events.contains(&(2, Color::Red)));
        assert!(shared.led_blinks.contains(&(2, Color::Red)));
        assert!(shared.melodies.contains(&(Melody::Error, false)));
        drop(shared);

        let lines = rig.take_output();
        assert!(lines.iter().any(|l| l.contains("INFO - Filament T2 removed")));
        // The abort path reports no travel total.
        assert!(!lines.iter().any(|l| l.contains("Extruded milimeters")));
        // No stall was declared: the motion was cut short, not stuck.
        assert!(!rig.controller.hub.is_stalled());
    }

    #[test]
    fn extrude_never_exceeds_its_budget() {
        let mut rig = Rig::new();
        rig.select_present_channel(4);
        rig.controller.extrude(10, 500);

        let budget = steps_from_mm(&rig, (50 + 60 + 10) as i64);
        // Stalled hunt issues budget + 1 steps and skips the overshoot.
        assert!(rig.shared.borrow().pulses <= budget + 1);
    }
}
