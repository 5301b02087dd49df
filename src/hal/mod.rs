// SPDX-License-Identifier: GPL-3.0-or-later

//! Capability traits for everything the controller touches. The motion and
//! dispatch code is generic over these, so the same core runs against the
//! real peripherals on a target and against simulated ones in tests.
//!
//! All operations are infallible by contract: indicators and audio are
//! best-effort and never fail a command, and the board layer owns pin
//! polarities (active-low sensors and enables never leak past here).

mod gpio_stepper;
pub use gpio_stepper::*;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Direction {
    // Feeds filament toward the hub.
    Forward,
    // Pulls filament back out of the hub.
    Reverse,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Color {
    Black,
    Red,
    Green,
    Blue,
    Yellow,
    White,
    Cyan,
    Magenta,
    Orange,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Melody {
    Startup,
    Error,
    FilamentInserted,
    FilamentRemoved,
    Victory,
}

impl Melody {
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Melody::Startup),
            1 => Some(Melody::Error),
            2 => Some(Melody::FilamentInserted),
            3 => Some(Melody::FilamentRemoved),
            4 => Some(Melody::Victory),
            _ => None,
        }
    }
}

/// Step/dir/enable interface of the feeder motor driver.
pub trait FeederDriver {
    fn enable(&mut self);
    fn disable(&mut self);
    fn set_direction(&mut self, direction: Direction);

    /// One step: raise STEP, hold `half_period_us`, drop it, hold again.
    /// Blocks for the full pulse period.
    fn pulse(&mut self, half_period_us: u16);
}

/// The two positioning servos. A write attaches the servo, drives it to
/// `degrees`, holds about a second for the horn to arrive, then detaches so
/// the servo doesn't sit there drawing holding current.
pub trait Servos {
    fn set_selector(&mut self, degrees: u16);
    fn set_cutter(&mut self, degrees: u16);
}

/// Per-channel indicator LEDs, addressed by channel index (the board maps
/// channels onto strip pixels). `blink` is five 200 ms on/off cycles,
/// finishing with the LED on.
pub trait LedPanel {
    fn set(&mut self, channel: usize, color: Color);
    fn blink(&mut self, channel: usize, color: Color);
    fn save(&mut self);
    fn restore(&mut self);
    fn clear(&mut self);
}

/// Buzzer cues. `play` blocks for the melody duration; `with_lights` adds
/// the panel light show used by the MIDI command.
pub trait AudioCues {
    fn play(&mut self, melody: Melody, with_lights: bool);
    fn click(&mut self);
}

/// Filament presence sensors and the action button, typically multiplexed
/// behind an I2C expander. Returns debounced logical state: `true` means
/// filament present / button held.
pub trait InputPort {
    fn filament_present(&mut self, channel: usize) -> bool;
    fn button_pressed(&mut self) -> bool;
}

/// The line to the host printer's filament-runout input.
/// `true` signals "filament missing" and pauses the print.
pub trait RunoutSignal {
    fn set_missing(&mut self, missing: bool);
}

/// Byte-level serial link to the host. `poll_byte` never blocks.
pub trait HostPort {
    fn poll_byte(&mut self) -> Option<u8>;
    fn write_str(&mut self, s: &str);
}

pub trait Clock {
    fn millis(&self) -> u32;
    fn delay_ms(&mut self, ms: u32);
}

/// The full set of peripherals a board provides.
pub trait Board {
    type Feeder: FeederDriver;
    type Servos: Servos;
    type Leds: LedPanel;
    type Audio: AudioCues;
    type Inputs: InputPort;
    type Runout: RunoutSignal;
    type Host: HostPort;
    type Clock: Clock;
}

/// Owned peripherals, assembled once at boot and handed to the controller.
pub struct Machine<B: Board> {
    pub feeder: B::Feeder,
    pub servos: B::Servos,
    pub leds: B::Leds,
    pub audio: B::Audio,
    pub inputs: B::Inputs,
    pub runout: B::Runout,
    pub host: B::Host,
    pub clock: B::Clock,
}
