// SPDX-License-Identifier: GPL-3.0-or-later

//! The host line protocol: newline-terminated commands in, `OK`/`ERROR`/
//! `ALIVE` plus timestamped log lines out. Parsing is case-insensitive
//! and whitespace-tolerant; anything malformed or out of range is
//! rejected with `ERROR` and no state change.

use core::fmt::{Arguments, Write as _};

use heapless::String;

use crate::consts::filament::COUNT;
use crate::consts::host::{LOG_LINE_CAPACITY, RETRACT_REPLY_SETTLE_MS};
use crate::controller::Controller;
use crate::hal::{AudioCues, Board, Clock, Color, HostPort, LedPanel, Melody};

#[derive(Debug, PartialEq)]
pub enum Command {
    Start,
    Sync(SyncArgs),
    Filament(usize),
    FilamentRelease,
    Extrude { mm: i32, rpm: u32 },
    Retract { mm: i32, rpm: u32 },
    SwapFinish,
    CutterPosition(u16),
    MmuPosition(u16),
    MmuRotate { degrees: i32, rpm: u32 },
    Midi(u32),
    TestLed(usize),
    TestLeds,
    Stress,
}

/// SYNC carries any subset of the config fields in one line; absent
/// fields keep their previous values.
#[derive(Debug, PartialEq, Default)]
pub struct SyncArgs {
    pub filament_positions: Option<[u16; COUNT]>,
    pub extrude_mm: Option<i32>,
    pub retract_mm: Option<i32>,
    pub min_retract_mm: Option<i32>,
    pub mm_per_rotation: Option<f64>,
    pub mm_to_stuck: Option<i32>,
}

impl Command {
    /// Parse an uppercased, trimmed line. None means ERROR.
    pub fn parse(line: &str) -> Option<Command> {
        let mut tokens = line.split_whitespace();

        let command = match tokens.next()? {
            "START" => Command::Start,
            "SYNC" => Command::Sync(SyncArgs::parse(&mut tokens)?),
            "FILAMENT" => {
                let channel: usize = tokens.next()?.parse().ok()?;
                if channel >= COUNT {
                    return None;
                }
                Command::Filament(channel)
            }
            "FILAMENT_RELEASE" => Command::FilamentRelease,
            "EXTRUDE" => Command::Extrude {
                mm: tokens.next()?.parse().ok()?,
                rpm: parse_optional_rpm(&mut tokens)?,
            },
            "RETRACT" => Command::Retract {
                mm: tokens.next()?.parse().ok()?,
                rpm: parse_optional_rpm(&mut tokens)?,
            },
            "SWAP_FINISH" => Command::SwapFinish,
            "CUTTER_POSITION" => Command::CutterPosition(tokens.next()?.parse().ok()?),
            "MMU_POSITION" => Command::MmuPosition(tokens.next()?.parse().ok()?),
            "MMU_ROTATE" => Command::MmuRotate {
                degrees: tokens.next()?.parse().ok()?,
                rpm: parse_optional_rpm(&mut tokens)?,
            },
            "MIDI" => Command::Midi(tokens.next()?.parse().ok()?),
            "TEST_LEDS" => Command::TestLeds,
            "TEST_LED" => {
                let number: usize = tokens.next()?.parse().ok()?;
                if number < 1 || number > COUNT {
                    return None;
                }
                Command::TestLed(number - 1)
            }
            "STRESS" => Command::Stress,
            _ => return None,
        };

        // Trailing junk makes the whole line malformed.
        if tokens.next().is_some() {
            return None;
        }

        Some(command)
    }
}

// The host may omit the rpm; zero selects the default speed downstream.
fn parse_optional_rpm<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<u32> {
    match tokens.next() {
        Some(token) => token.parse().ok(),
        None => Some(0),
    }
}

impl SyncArgs {
    fn parse<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<SyncArgs> {
        let mut args = SyncArgs::default();

        while let Some(keyword) = tokens.next() {
            match keyword {
                "FILAMENT_POSITIONS" => {
                    let mut positions = [0u16; COUNT];
                    for slot in positions.iter_mut() {
                        *slot = tokens.next()?.parse().ok()?;
                    }
                    args.filament_positions = Some(positions);
                }
                "EXTRUDE_MM" => args.extrude_mm = Some(tokens.next()?.parse().ok()?),
                "RETRACT_MM" => args.retract_mm = Some(tokens.next()?.parse().ok()?),
                "MIN_RETRACT_MM" => args.min_retract_mm = Some(tokens.next()?.parse().ok()?),
                "MM_PER_ROTATION" => args.mm_per_rotation = Some(tokens.next()?.parse().ok()?),
                "MM_TO_STUCK" => args.mm_to_stuck = Some(tokens.next()?.parse().ok()?),
                _ => return None,
            }
        }

        Some(args)
    }
}

const LED_TEST_SEQUENCE: [Color; 8] = [
    Color::Red,
    Color::Green,
    Color::Blue,
    Color::Yellow,
    Color::Cyan,
    Color::Magenta,
    Color::Orange,
    Color::White,
];

impl<B: Board> Controller<B> {
    /// A full line has arrived: normalize, parse, execute.
    pub(crate) fn dispatch_line(&mut self) {
        let mut line = core::mem::take(&mut self.line);
        let overflow = self.line_overflow;
        self.line_overflow = false;

        line.make_ascii_uppercase();
        let line = line.trim();

        log::debug!("host line: {:?}", line);

        if overflow {
            self.log_error(format_args!("Unknown command {}", line));
            self.reply_error();
            return;
        }

        match Command::parse(line) {
            Some(command) => self.execute(command),
            None => {
                self.log_error(format_args!("Unknown command {}", line));
                self.reply_error();
            }
        }
    }

    pub(crate) fn execute(&mut self, command: Command) {
        match command {
            Command::Start => {
                self.start();
                self.reply_ok();
            }

            Command::Sync(args) => {
                self.log_info(format_args!("Syncing config..."));

                if let Some(positions) = args.filament_positions {
                    self.config.filament_positions = positions;
                }
                if let Some(mm) = args.extrude_mm {
                    self.config.extrude_mm = mm;
                }
                if let Some(mm) = args.retract_mm {
                    self.config.retract_mm = mm;
                }
                if let Some(mm) = args.min_retract_mm {
                    self.config.min_retract_mm = mm;
                }
                if let Some(mm) = args.mm_per_rotation {
                    self.config.mm_per_rotation = mm;
                }
                if let Some(mm) = args.mm_to_stuck {
                    self.config.mm_to_stuck = mm;
                }

                self.log_info(format_args!("New positions: "));
                for channel in 0..COUNT {
                    let degrees = self.config.filament_positions[channel];
                    self.log_info(format_args!("{} => {}", channel + 1, degrees));
                }

                let extrude_mm = self.config.extrude_mm;
                self.log_info(format_args!("New extrude mm: {}", extrude_mm));
                let retract_mm = self.config.retract_mm;
                self.log_info(format_args!("New retract mm: {}", retract_mm));
                let min_retract_mm = self.config.min_retract_mm;
                self.log_info(format_args!(
                    "New min retract mm: {}",
                    min_retract_mm
                ));
                let mm_per_rotation = self.config.mm_per_rotation;
                self.log_info(format_args!(
                    "New mm per rotation: {}",
                    mm_per_rotation
                ));
                let mm_to_stuck = self.config.mm_to_stuck;
                self.log_info(format_args!("New mm to stuck: {}", mm_to_stuck));
                self.log_info(format_args!("Config synced"));
                self.reply_ok();
            }

            Command::Filament(channel) => {
                self.log_info(format_args!("Setting filament T{}", channel));

                if self.select_filament(channel) {
                    self.log_info(format_args!("Filament set"));
                    self.reply_ok();
                } else {
                    self.log_error(format_args!("Failed to set filament T{}", channel));
                    self.reply_error();
                }
            }

            Command::FilamentRelease => {
                self.log_info(format_args!("Releasing filament"));

                // Fire-and-forget for the host: acknowledge first.
                self.reply_ok();
                self.filament_release();

                self.log_info(format_args!("Filament released"));
            }

            Command::Extrude { mm, rpm } => {
                self.log_info(format_args!("Extruding..."));
                self.extrude(mm, rpm);
                self.log_info(format_args!("Extruded"));
                self.reply_ok();
            }

            Command::Retract { mm, rpm } => {
                self.log_info(format_args!("Retracting..."));

                // Fire-and-forget for the host: acknowledge first.
                self.reply_ok();
                self.machine.clock.delay_ms(RETRACT_REPLY_SETTLE_MS);

                self.retract(mm, rpm);
                self.log_info(format_args!("Retracted"));
            }

            Command::SwapFinish => {
                self.log_info(format_args!("Swap finishing..."));

                if self.swap_finish() {
                    self.log_info(format_args!("Swap finished"));
                    self.reply_ok();
                } else {
                    self.log_info(format_args!("Swap not finished"));
                    self.reply_error();
                }
            }

            Command::CutterPosition(degrees) => {
                self.log_info(format_args!("Setting cutter position to {}", degrees));
                self.set_cutter_position(degrees);
                self.log_info(format_args!("Cutter position set to {}", degrees));
                self.reply_ok();
            }

            Command::MmuPosition(degrees) => {
                self.log_info(format_args!("Setting MMU position to {}", degrees));
                self.set_selector_position(degrees);
                self.log_info(format_args!("MMU position set to {}", degrees));
                self.reply_ok();
            }

            Command::MmuRotate { degrees, rpm } => {
                self.log_info(format_args!("Rotating MMU {}", degrees));
                self.log_info(format_args!("RPM {}", rpm));
                self.rotate_feeder(degrees, rpm, true, true, false);
                self.log_info(format_args!("MMU rotated {}", degrees));
                self.reply_ok();
            }

            Command::Midi(index) => {
                self.log_info(format_args!("Playing MIDI {}", index));

                match Melody::from_index(index) {
                    Some(melody) => {
                        self.machine.audio.play(melody, true);
                        self.log_info(format_args!("MIDI played"));
                        self.reply_ok();
                    }
                    None => {
                        self.log_error(format_args!("Unknown MIDI {}", index));
                        self.log_error(format_args!("Failed to play MIDI {}", index));
                        self.reply_error();
                    }
                }
            }

            Command::TestLed(channel) => {
                self.log_info(format_args!("Testing LED {}", channel + 1));

                self.log_info(format_args!("Testing LEDs"));
                self.machine.leds.save();
                self.led_test_cycle(channel);
                self.machine.leds.restore();

                self.log_info(format_args!("LED tested"));
                self.reply_ok();
            }

            Command::TestLeds => {
                self.log_info(format_args!("Testing LEDs..."));

                self.log_info(format_args!("Testing LEDs"));
                self.machine.leds.save();
                for channel in 0..COUNT {
                    self.led_test_cycle(channel);
                }
                self.machine.leds.restore();

                self.log_info(format_args!("LEDs tested"));
                self.reply_ok();
            }

            Command::Stress => {
                self.log_info(format_args!("Stressing... "));

                for _ in 0..10 {
                    self.set_selector_position(0);
                    self.set_selector_position(180);
                }

                self.reply_ok();
            }
        }
    }

    fn led_test_cycle(&mut self, channel: usize) {
        self.log_info(format_args!("Testing LED {}", channel + 1));

        for color in LED_TEST_SEQUENCE {
            self.machine.leds.blink(channel, color);
        }
    }

    pub(crate) fn reply_ok(&mut self) {
        self.machine.host.write_str("OK\n");
    }

    pub(crate) fn reply_error(&mut self) {
        self.machine.host.write_str("ERROR\n");
    }

    pub(crate) fn reply_alive(&mut self) {
        self.machine.host.write_str("ALIVE\n");
    }

    pub(crate) fn log_info(&mut self, message: Arguments) {
        self.log_line("INFO", message);
    }

    pub(crate) fn log_warn(&mut self, message: Arguments) {
        self.log_line("WARN", message);
    }

    pub(crate) fn log_error(&mut self, message: Arguments) {
        self.log_line("ERROR", message);
    }

    // A line that outgrows the buffer goes out truncated rather than
    // split: the host's reader treats anything bracketed as advisory.
    fn log_line(&mut self, level: &str, message: Arguments) {
        let mut line: String<LOG_LINE_CAPACITY> = String::new();
        let _ = write!(line, "[{}] {} - {}", self.machine.clock.millis(), level, message);
        self.machine.host.write_str(&line);
        self.machine.host.write_str("\n");
    }
}
