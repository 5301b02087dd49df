// SPDX-License-Identifier: GPL-3.0-or-later

pub mod filament {
    pub const COUNT: usize = 8;

    // Two bars of 8 LEDs. Channel i lights the strip pixel at LED_POSITIONS[i].
    pub const LED_STRIP_LEN: usize = 16;
    pub const LED_POSITIONS: [usize; COUNT] = [0, 3, 5, 7, 8, 11, 13, 15];

    // Selector angles above this park at channel 7's slot on release,
    // anything at or below parks at channel 0's.
    pub const RELEASE_PARK_THRESHOLD_DEGREES: u16 = 90;
}

pub mod feeder {
    pub const FULL_STEPS_PER_REVOLUTION: u32 = 200;
    pub const MICROSTEPS: u32 = 64;

    pub const MIN_RPM: u32 = 50;
    pub const DEFAULT_RPM: u32 = 500;

    // Half-period at the slow end of the ramp. The ramp moves the
    // half-period by 1us every ACCEL_DECEL_SKIP_STEPS issued steps.
    pub const SLOW_PULSE_DELAY_US: u16 = 50;
    pub const ACCEL_DECEL_SKIP_STEPS: u32 = 200;

    // How often (in issued steps) the hunt loop re-reads the active
    // channel's presence sensor. Ten feeder revolutions.
    pub const SENSOR_CHECK_INTERVAL: u32 = FULL_STEPS_PER_REVOLUTION * MICROSTEPS * 10;
}

pub mod host {
    pub const ALIVE_INTERVAL_MS: u32 = 5000;

    // Longest accepted command line. SYNC with every field present is ~90 bytes.
    pub const LINE_CAPACITY: usize = 128;
    pub const LOG_LINE_CAPACITY: usize = 160;

    // OK for RETRACT goes out before the motion; give the host a moment to
    // drain it before the loop goes quiet.
    pub const RETRACT_REPLY_SETTLE_MS: u32 = 100;
}

pub mod panel {
    pub const STARTUP_SWEEP_STEP_MS: u32 = 100;
    pub const STARTUP_BLINK_INTERVAL_MS: u32 = 500;
    pub const BOOT_FAILURE_BLINK_MS: u32 = 500;
}
