// SPDX-License-Identifier: GPL-3.0-or-later

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::OutputPin;

use super::{Direction, FeederDriver};

/// FeederDriver over plain step/dir/enable GPIOs, for driver boards like the
/// A4988/TMC-class breakouts. ENABLE is active-low; DIR high feeds forward.
pub struct GpioStepper<Step, Dir, En, D> {
    step: Step,
    dir: Dir,
    enable: En,
    delay: D,
}

impl<Step, Dir, En, D> GpioStepper<Step, Dir, En, D>
where
    Step: OutputPin,
    Dir: OutputPin,
    En: OutputPin,
    D: DelayUs<u16>,
{
    /// The driver starts disabled.
    pub fn new(step: Step, dir: Dir, mut enable: En, delay: D) -> Self {
        let _ = enable.set_high();
        Self { step, dir, enable, delay }
    }
}

impl<Step, Dir, En, D> FeederDriver for GpioStepper<Step, Dir, En, D>
where
    Step: OutputPin,
    Dir: OutputPin,
    En: OutputPin,
    D: DelayUs<u16>,
{
    fn enable(&mut self) {
        let _ = self.enable.set_low();
    }

    fn disable(&mut self) {
        let _ = self.enable.set_high();
    }

    fn set_direction(&mut self, direction: Direction) {
        match direction {
            Direction::Forward => {
                let _ = self.dir.set_high();
            }
            Direction::Reverse => {
                let _ = self.dir.set_low();
            }
        }
    }

    fn pulse(&mut self, half_period_us: u16) {
        let _ = self.step.set_high();
        self.delay.delay_us(half_period_us);
        let _ = self.step.set_low();
        self.delay.delay_us(half_period_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::convert::Infallible;
    use std::rc::Rc;

    #[derive(Clone, Debug, PartialEq)]
    enum Event {
        Pin(&'static str, bool),
        Wait(u16),
    }

    type Trace = Rc<RefCell<Vec<Event>>>;

    struct TracePin(&'static str, Trace);

    impl OutputPin for TracePin {
        type Error = Infallible;

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.1.borrow_mut().push(Event::Pin(self.0, true));
            Ok(())
        }

        fn set_low(&mut self) -> Result<(), Infallible> {
            self.1.borrow_mut().push(Event::Pin(self.0, false));
            Ok(())
        }
    }

    struct TraceDelay(Trace);

    impl DelayUs<u16> for TraceDelay {
        fn delay_us(&mut self, us: u16) {
            self.0.borrow_mut().push(Event::Wait(us));
        }
    }

    fn rigged() -> (GpioStepper<TracePin, TracePin, TracePin, TraceDelay>, Trace) {
        let trace: Trace = Rc::new(RefCell::new(Vec::new()));
        let stepper = GpioStepper::new(
            TracePin("step", trace.clone()),
            TracePin("dir", trace.clone()),
            TracePin("en", trace.clone()),
            TraceDelay(trace.clone()),
        );
        (stepper, trace)
    }

    #[test]
    fn enable_line_is_active_low() {
        let (mut stepper, trace) = rigged();
        // Construction leaves the driver off.
        assert_eq!(trace.borrow()[0], Event::Pin("en", true));

        stepper.enable();
        stepper.disable();
        let events = trace.borrow();
        assert_eq!(events[1], Event::Pin("en", false));
        assert_eq!(events[2], Event::Pin("en", true));
    }

    #[test]
    fn a_pulse_is_a_timed_square_wave() {
        let (mut stepper, trace) = rigged();
        trace.borrow_mut().clear();

        stepper.set_direction(Direction::Reverse);
        stepper.pulse(25);

        assert_eq!(
            *trace.borrow(),
            vec![
                Event::Pin("dir", false),
                Event::Pin("step", true),
                Event::Wait(25),
                Event::Pin("step", false),
                Event::Wait(25),
            ]
        );
    }
}
