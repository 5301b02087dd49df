// SPDX-License-Identifier: GPL-3.0-or-later

//! Simulated peripherals for the test suite. Every trait records what the
//! controller did to it, and the stepper applies scripted hub and sensor
//! events at exact step counts, standing in for the edge ISR and the
//! expander during motion.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::consts::filament::COUNT;
use crate::controller::Controller;
use crate::hal::{
    AudioCues, Board, Clock, Color, Direction, FeederDriver, HostPort, InputPort, LedPanel,
    Machine, Melody, RunoutSignal, Servos,
};
use crate::hub::HubLatch;

pub struct SimState {
    pub now_ms: u32,

    pub pulses: u32,
    pub pulse_delays: Vec<u16>,
    pub enabled: bool,
    pub enable_transitions: Vec<bool>,
    pub direction: Direction,

    pub filament_present: [bool; COUNT],
    pub button: bool,

    pub led_current: [Color; COUNT],
    led_saved: [Color; COUNT],
    pub led_events: Vec<(usize, Color)>,
    pub led_blinks: Vec<(usize, Color)>,

    pub melodies: Vec<(Melody, bool)>,
    pub clicks: u32,

    pub selector_moves: Vec<u16>,
    pub cutter_moves: Vec<u16>,

    pub missing_signal: Vec<bool>,

    pub tx: String,
    pub rx: VecDeque<u8>,

    // (at pulse count, hub reads filament present)
    pub hub_script: Vec<(u32, bool)>,
    // (at pulse count, channel, filament present)
    pub sensor_script: Vec<(u32, usize, bool)>,

    hub: &'static HubLatch,
}

pub type Shared = Rc<RefCell<SimState>>;

impl SimState {
    fn new(hub: &'static HubLatch) -> Self {
        Self {
            now_ms: 0,
            pulses: 0,
            pulse_delays: Vec::new(),
            enabled: false,
            enable_transitions: Vec::new(),
            direction: Direction::Forward,
            filament_present: [false; COUNT],
            button: false,
            led_current: [Color::Black; COUNT],
            led_saved: [Color::Black; COUNT],
            led_events: Vec::new(),
            led_blinks: Vec::new(),
            melodies: Vec::new(),
            clicks: 0,
            selector_moves: Vec::new(),
            cutter_moves: Vec::new(),
            missing_signal: Vec::new(),
            tx: String::new(),
            rx: VecDeque::new(),
            hub_script: Vec::new(),
            sensor_script: Vec::new(),
            hub,
        }
    }
}

pub struct SimFeeder(Shared);

impl FeederDriver for SimFeeder {
    fn enable(&mut self) {
        let mut s = self.0.borrow_mut();
        s.enabled = true;
        s.enable_transitions.push(true);
    }

    fn disable(&mut self) {
        let mut s = self.0.borrow_mut();
        s.enabled = false;
        s.enable_transitions.push(false);
    }

    fn set_direction(&mut self, direction: Direction) {
        self.0.borrow_mut().direction = direction;
    }

    fn pulse(&mut self, half_period_us: u16) {
        let mut s = self.0.borrow_mut();
        s.pulses += 1;
        s.pulse_delays.push(half_period_us);

        let count = s.pulses;
        let hub = s.hub;
        s.hub_script.retain(|&(at, present)| {
            if at <= count {
                hub.isr_update(present);
                false
            } else {
                true
            }
        });

        let due: Vec<(usize, bool)> = s
            .sensor_script
            .iter()
            .filter(|&&(at, _, _)| at <= count)
            .map(|&(_, channel, present)| (channel, present))
            .collect();
        s.sensor_script.retain(|&(at, _, _)| at > count);
        for (channel, present) in due {
            s.filament_present[channel] = present;
        }
    }
}

pub struct SimServos(Shared);

impl Servos for SimServos {
    fn set_selector(&mut self, degrees: u16) {
        let mut s = self.0.borrow_mut();
        s.selector_moves.push(degrees);
        s.now_ms += 1000; // attach, write, hold, detach
    }

    fn set_cutter(&mut self, degrees: u16) {
        let mut s = self.0.borrow_mut();
        s.cutter_moves.push(degrees);
        s.now_ms += 1000;
    }
}

pub struct SimLeds(Shared);

impl LedPanel for SimLeds {
    fn set(&mut self, channel: usize, color: Color) {
        let mut s = self.0.borrow_mut();
        s.led_current[channel] = color;
        s.led_events.push((channel, color));
    }

    fn blink(&mut self, channel: usize, color: Color) {
        let mut s = self.0.borrow_mut();
        s.led_current[channel] = color;
        s.led_blinks.push((channel, color));
    }

    fn save(&mut self) {
        let mut s = self.0.borrow_mut();
        s.led_saved = s.led_current;
    }

    fn restore(&mut self) {
        let mut s = self.0.borrow_mut();
        s.led_current = s.led_saved;
    }

    fn clear(&mut self) {
        self.0.borrow_mut().led_current = [Color::Black; COUNT];
    }
}

pub struct SimAudio(Shared);

impl AudioCues for SimAudio {
    fn play(&mut self, melody: Melody, with_lights: bool) {
        self.0.borrow_mut().melodies.push((melody, with_lights));
    }

    fn click(&mut self) {
        self.0.borrow_mut().clicks += 1;
    }
}

pub struct SimInputs(Shared);

impl InputPort for SimInputs {
    fn filament_present(&mut self, channel: usize) -> bool {
        self.0.borrow().filament_present[channel]
    }

    fn button_pressed(&mut self) -> bool {
        self.0.borrow().button
    }
}

pub struct SimRunout(Shared);

impl RunoutSignal for SimRunout {
    fn set_missing(&mut self, missing: bool) {
        self.0.borrow_mut().missing_signal.push(missing);
    }
}

pub struct SimHost(Shared);

impl HostPort for SimHost {
    fn poll_byte(&mut self) -> Option<u8> {
        self.0.borrow_mut().rx.pop_front()
    }

    fn write_str(&mut self, s: &str) {
        self.0.borrow_mut().tx.push_str(s);
    }
}

pub struct SimClock(Shared);

impl Clock for SimClock {
    fn millis(&self) -> u32 {
        self.0.borrow().now_ms
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.borrow_mut().now_ms += ms;
    }
}

pub struct SimBoard;

impl Board for SimBoard {
    type Feeder = SimFeeder;
    type Servos = SimServos;
    type Leds = SimLeds;
    type Audio = SimAudio;
    type Inputs = SimInputs;
    type Runout = SimRunout;
    type Host = SimHost;
    type Clock = SimClock;
}

/// A controller wired to a fresh simulated board.
pub struct Rig {
    pub shared: Shared,
    pub controller: Controller<SimBoard>,
}

impl Rig {
    pub fn new() -> Self {
        let hub: &'static HubLatch = Box::leak(Box::new(HubLatch::new()));
        let shared: Shared = Rc::new(RefCell::new(SimState::new(hub)));

        let machine = Machine::<SimBoard> {
            feeder: SimFeeder(shared.clone()),
            servos: SimServos(shared.clone()),
            leds: SimLeds(shared.clone()),
            audio: SimAudio(shared.clone()),
            inputs: SimInputs(shared.clone()),
            runout: SimRunout(shared.clone()),
            host: SimHost(shared.clone()),
            clock: SimClock(shared.clone()),
        };

        Self {
            shared,
            controller: Controller::new(machine, hub),
        }
    }

    /// Queue a full command line on the host port.
    pub fn send_line(&mut self, line: &str) {
        let mut s = self.shared.borrow_mut();
        s.rx.extend(line.bytes());
        s.rx.push_back(b'\n');
    }

    /// Drain everything written to the host since the last call, split
    /// into lines.
    pub fn take_output(&mut self) -> Vec<String> {
        let mut s = self.shared.borrow_mut();
        let drained = std::mem::take(&mut s.tx);
        drained.lines().map(str::to_owned).collect()
    }

    /// Run the START sequence and drain its chatter.
    pub fn start(&mut self) {
        self.send_line("START");
        self.controller.tick();
        self.take_output();
    }

    /// Latch filament arriving at the hub, as the edge ISR would.
    pub fn hub_insert(&mut self) {
        self.controller.hub.isr_update(true);
    }

    /// Re-scan the presence sensors without audio side effects.
    pub fn refresh_sensors(&mut self) {
        self.controller.poll_sensors(false);
    }

    /// Load a channel, sync the sensor table, and select it.
    pub fn select_present_channel(&mut self, channel: usize) {
        self.shared.borrow_mut().filament_present[channel] = true;
        self.refresh_sensors();
        assert!(self.controller.select_filament(channel));
    }
}
