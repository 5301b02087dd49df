// SPDX-License-Identifier: GPL-3.0-or-later

//! The feeder's pulse generator: a counted train of step pulses at a
//! commanded speed, with a linear ramp on both ends. The ramp walks the
//! half-period by one microsecond every ACCEL_DECEL_SKIP_STEPS issued
//! steps, so it is monotone in each phase whatever the speed delta is.

use super::{effective_rpm, target_half_period_us, units};
use crate::consts::feeder::{ACCEL_DECEL_SKIP_STEPS, SLOW_PULSE_DELAY_US};
use crate::controller::Controller;
use crate::hal::{Board, Direction, FeederDriver};

impl<B: Board> Controller<B> {
    /// Rotate the feeder shaft by `degrees` (sign picks the direction) at
    /// `rpm`, returning the number of steps actually issued.
    ///
    /// With `reset_on_hub_edge`, a hub sensor change mid-travel restarts
    /// the countdown from the edge at full speed: the motion ends a full
    /// `degrees` past the last edge seen, which is how a retract parks the
    /// filament tip a fixed distance behind the sensor regardless of slack.
    ///
    /// Blocks until done. The driver is left disabled.
    pub fn rotate_feeder(
        &mut self,
        degrees: i32,
        rpm: u32,
        accelerate: bool,
        decelerate: bool,
        reset_on_hub_edge: bool,
    ) -> u32 {
        if degrees == 0 {
            return 0;
        }

        self.machine.feeder.enable();
        let direction = if degrees < 0 { Direction::Reverse } else { Direction::Forward };
        self.machine.feeder.set_direction(direction);

        let rpm = effective_rpm(rpm);
        let steps = units::steps_from_degrees(degrees.unsigned_abs());
        let deceleration_start = steps - steps / 100;

        let target_delay = target_half_period_us(rpm);
        let mut current_delay = if accelerate { SLOW_PULSE_DELAY_US } else { target_delay };
        let mut skip_count: u32 = 0;
        let mut accelerated = false;
        let mut last_hub = self.hub.filament_present();
        let mut total_steps: u32 = 0;

        let mut i: u32 = 0;
        while i < steps {
            if skip_count > ACCEL_DECEL_SKIP_STEPS {
                if decelerate && current_delay != SLOW_PULSE_DELAY_US && i > deceleration_start {
                    skip_count = 0;
                    current_delay += 1;

                    if current_delay > SLOW_PULSE_DELAY_US {
                        current_delay = SLOW_PULSE_DELAY_US;
                    }
                } else if accelerate && !accelerated && current_delay != target_delay {
                    skip_count = 0;
                    current_delay -= 1;

                    if current_delay < target_delay {
                        current_delay = target_delay;
                        accelerated = true;
                    }
                }
            }

            skip_count += 1;
            total_steps += 1;

            let hub_now = self.hub.filament_present();
            if hub_now != last_hub && reset_on_hub_edge {
                self.log_info(format_args!("Resetting on filament sensor"));

                i = 0;
                skip_count = 0;
                current_delay = target_delay;
                last_hub = hub_now;
            }

            self.machine.feeder.pulse(current_delay);
            i += 1;
        }

        self.machine.feeder.disable();
        log::debug!("rotated {} degrees in {} steps", degrees, total_steps);

        total_steps
    }
}
