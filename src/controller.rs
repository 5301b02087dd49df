// SPDX-License-Identifier: GPL-3.0-or-later

use heapless::String;

use crate::channels::Channels;
use crate::config::MotionConfig;
use crate::consts::{filament, host, panel};
use crate::hal::{AudioCues, Board, Clock, Color, HostPort, LedPanel, Machine, Melody, Servos};
use crate::hub::HubLatch;

/// The firmware core: owns the peripherals and every piece of mutable
/// state, and advances one main-loop iteration per `tick()` call.
///
/// Motion commands run to completion inside a single tick; only the hub
/// edge ISR (feeding `HubLatch`) runs concurrently with them.
pub struct Controller<B: Board> {
    pub(crate) machine: Machine<B>,
    pub(crate) hub: &'static HubLatch,
    pub(crate) channels: Channels,
    pub(crate) config: MotionConfig,

    pub(crate) started: bool,
    pub(crate) auto_extruding: bool,

    // Host line assembly.
    pub(crate) line: String<{ host::LINE_CAPACITY }>,
    pub(crate) line_overflow: bool,

    // Last hub state the foreground loop has seen, for edge detection.
    pub(crate) last_hub_present: bool,

    pub(crate) last_selector_degrees: u16,

    // millis() at button press-down; 0 while released.
    pub(crate) button_press_start_ms: u32,
    pub(crate) previous_alive_ms: u32,
    pub(crate) previous_blink_ms: u32,
    pub(crate) blink_lit: bool,
}

impl<B: Board> Controller<B> {
    /// `hub` must already be latched from a boot-time read of the hub pin,
    /// with the edge ISR armed to keep it current.
    pub fn new(machine: Machine<B>, hub: &'static HubLatch) -> Self {
        let last_hub_present = hub.filament_present();
        Self {
            machine,
            hub,
            channels: Channels::new(),
            config: MotionConfig::new(),
            started: false,
            auto_extruding: false,
            line: String::new(),
            line_overflow: false,
            last_hub_present,
            last_selector_degrees: 0,
            button_press_start_ms: 0,
            previous_alive_ms: 0,
            previous_blink_ms: 0,
            blink_lit: false,
        }
    }

    /// Boot-time announcement: park both servos and tell the host we are
    /// listening. Runs once, before the first `tick()`.
    pub fn boot(&mut self) {
        self.log_info(format_args!("Starting..."));
        self.set_cutter_position(0);
        self.set_selector_position(0);
        self.machine.host.write_str("READY\n");
        log::debug!("boot complete");
    }

    /// One main-loop iteration: feed the dispatcher if a line completed,
    /// then run the foreground poller (or the waiting-for-START blink).
    pub fn tick(&mut self) {
        while let Some(byte) = self.machine.host.poll_byte() {
            if byte == b'\n' {
                self.dispatch_line();
                break;
            }
            if self.line.push(byte as char).is_err() {
                self.line_overflow = true;
            }
        }

        if self.started {
            self.poll_sensors(true);
            self.poll_hub();
            self.poll_button();
            self.poll_alive();
        } else {
            self.blink_waiting_leds();
        }
    }

    /// START: visual+audio greeting, then arm the foreground poller.
    pub(crate) fn start(&mut self) {
        self.log_info(format_args!("Starting up..."));

        self.machine.leds.clear();
        for channel in 0..filament::COUNT {
            self.machine.leds.set(channel, Color::Cyan);
            self.machine.clock.delay_ms(panel::STARTUP_SWEEP_STEP_MS);
        }
        self.machine.audio.play(Melody::Startup, true);
        for channel in (0..filament::COUNT).rev() {
            self.machine.leds.set(channel, Color::Black);
            self.machine.clock.delay_ms(panel::STARTUP_SWEEP_STEP_MS);
        }

        // Fresh baseline: the ISR has kept the latch current since boot,
        // so re-snapshotting here is the "re-read the pin" of old.
        self.hub.clear_stalled();
        self.last_hub_present = self.hub.filament_present();
        self.poll_sensors(false);

        self.started = true;
        self.log_info(format_args!("Started"));
    }

    /// Orange/black blink of the whole panel until START arrives.
    pub(crate) fn blink_waiting_leds(&mut self) {
        let now = self.machine.clock.millis();
        if now.wrapping_sub(self.previous_blink_ms) >= panel::STARTUP_BLINK_INTERVAL_MS {
            self.previous_blink_ms = now;
            self.blink_lit = !self.blink_lit;

            let color = if self.blink_lit { Color::Orange } else { Color::Black };
            for channel in 0..filament::COUNT {
                self.machine.leds.set(channel, color);
            }
        }
    }

    pub(crate) fn set_selector_position(&mut self, degrees: u16) {
        self.last_selector_degrees = degrees;
        self.machine.servos.set_selector(degrees);
    }

    pub(crate) fn set_cutter_position(&mut self, degrees: u16) {
        self.machine.servos.set_cutter(degrees);
    }
}

/// Fatal boot path: the board could not bring up the I/O expander, so
/// neither sensors nor the button exist. Flash the panel red forever.
pub fn boot_failure<L: LedPanel, C: Clock>(leds: &mut L, clock: &mut C) -> ! {
    loop {
        for channel in 0..filament::COUNT {
            leds.set(channel, Color::Red);
        }
        clock.delay_ms(panel::BOOT_FAILURE_BLINK_MS);

        for channel in 0..filament::COUNT {
            leds.set(channel, Color::Black);
        }
        clock.delay_ms(panel::BOOT_FAILURE_BLINK_MS);
    }
}
