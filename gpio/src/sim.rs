//! A software GPIO backend that models a switch matrix electrically.
//!
//! Every pin keeps a mode, a bias and an output latch. Switches connect a row pin to a column pin
//! while closed. An input reads low when a closed switch ties it to an output latched low,
//! otherwise it follows its bias. Floating inputs read high.
//!
//! Time is virtual: [GpioDriver::sleep] advances the clock instantly, and switch changes can be
//! scheduled for a point on that clock.

use crate::claims::PinClaims;
use crate::{GpioBias, GpioDriver, GpioError, GpioLevel, GpioMode, GpioResult};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::io::ErrorKind;
use std::time::Duration;

#[derive(Copy, Clone, Debug)]
struct SimPin {
    mode: GpioMode,
    bias: GpioBias,
    latch: GpioLevel,
}

impl Default for SimPin {
    fn default() -> Self {
        SimPin {
            mode: GpioMode::Input,
            bias: GpioBias::None,
            latch: GpioLevel::High,
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct SwitchChange {
    at: Duration,
    switch: (usize, usize),
    closed: bool,
}

#[derive(Debug, Default)]
struct SimState {
    pins: Vec<SimPin>,
    closed: HashSet<(usize, usize)>,
    pending: Vec<SwitchChange>,
    faulty: HashSet<usize>,
    now: Duration,
    sleeps: usize,
}

impl SimState {
    fn apply_due(&mut self) {
        let now = self.now;
        let (due, pending): (Vec<_>, Vec<_>) = self.pending.drain(..).partition(|c| c.at <= now);
        self.pending = pending;
        for change in due {
            if change.closed {
                self.closed.insert(change.switch);
            } else {
                self.closed.remove(&change.switch);
            }
        }
    }

    fn pin(&self, index: usize) -> GpioResult<&SimPin> {
        if self.faulty.contains(&index) {
            return Err(GpioError::Io(ErrorKind::PermissionDenied));
        }
        self.pins.get(index).ok_or(GpioError::InvalidArgument)
    }

    fn pin_mut(&mut self, index: usize) -> GpioResult<&mut SimPin> {
        self.pins.get_mut(index).ok_or(GpioError::InvalidArgument)
    }

    fn is_driven_low(&self, index: usize) -> bool {
        self.pins
            .get(index)
            .is_some_and(|pin| pin.mode == GpioMode::Output && pin.latch.is_low())
    }

    fn level(&self, index: usize) -> GpioResult<GpioLevel> {
        let pin = self.pin(index)?;
        if pin.mode == GpioMode::Output {
            return Ok(pin.latch);
        }

        let pulled_low = self.closed.iter().any(|&(row, column)| {
            (column == index && self.is_driven_low(row)) || (row == index && self.is_driven_low(column))
        });

        if pulled_low {
            return Ok(GpioLevel::Low);
        }

        Ok(match pin.bias {
            GpioBias::PullDown => GpioLevel::Low,
            GpioBias::PullUp | GpioBias::None => GpioLevel::High,
        })
    }
}

/// A simulated GPIO controller with `count` pins, all starting as floating inputs.
pub struct SimGpioDriver {
    state: RefCell<SimState>,
    claims: PinClaims,
}

impl SimGpioDriver {
    pub fn new(count: usize) -> Self {
        SimGpioDriver {
            state: RefCell::new(SimState {
                pins: vec![SimPin::default(); count],
                ..SimState::default()
            }),
            claims: PinClaims::new(count),
        }
    }

    /// Closes the switch between `row_pin` and `column_pin`.
    pub fn press_key(&self, row_pin: usize, column_pin: usize) {
        self.state.borrow_mut().closed.insert((row_pin, column_pin));
    }

    /// Opens the switch between `row_pin` and `column_pin`.
    pub fn release_key(&self, row_pin: usize, column_pin: usize) {
        self.state.borrow_mut().closed.remove(&(row_pin, column_pin));
    }

    /// Closes the switch once the virtual clock reaches `at`.
    pub fn press_key_at(&self, at: Duration, row_pin: usize, column_pin: usize) {
        self.schedule(at, (row_pin, column_pin), true);
    }

    /// Opens the switch once the virtual clock reaches `at`.
    pub fn release_key_at(&self, at: Duration, row_pin: usize, column_pin: usize) {
        self.schedule(at, (row_pin, column_pin), false);
    }

    fn schedule(&self, at: Duration, switch: (usize, usize), closed: bool) {
        let mut state = self.state.borrow_mut();
        state.pending.push(SwitchChange { at, switch, closed });
        state.pending.sort_by_key(|change| change.at);
        state.apply_due();
    }

    /// Makes every further read of the pin fail with a permission error.
    pub fn inject_read_fault(&self, index: usize) {
        self.state.borrow_mut().faulty.insert(index);
    }

    /// Time spent in [GpioDriver::sleep] so far.
    pub fn elapsed(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of non-zero sleeps performed so far.
    pub fn sleep_count(&self) -> usize {
        self.state.borrow().sleeps
    }

    pub fn mode(&self, index: usize) -> Option<GpioMode> {
        self.state.borrow().pins.get(index).map(|pin| pin.mode)
    }

    pub fn bias(&self, index: usize) -> Option<GpioBias> {
        self.state.borrow().pins.get(index).map(|pin| pin.bias)
    }

    pub fn is_claimed(&self, index: usize) -> bool {
        self.claims.is_claimed(index)
    }
}

impl Debug for SimGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        write!(f, "SimGpioDriver({} pins, t={:?})", state.pins.len(), state.now)
    }
}

impl GpioDriver for SimGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.claims.count())
    }

    fn claim(&self, index: usize) -> GpioResult<()> {
        self.claims.claim(index)
    }

    fn release(&self, index: usize) {
        self.claims.release(index);
    }

    fn set_mode(&self, index: usize, mode: GpioMode) -> GpioResult<()> {
        self.state.borrow_mut().pin_mut(index)?.mode = mode;
        Ok(())
    }

    fn set_bias(&self, index: usize, bias: GpioBias) -> GpioResult<()> {
        self.state.borrow_mut().pin_mut(index)?.bias = bias;
        Ok(())
    }

    fn write(&self, index: usize, level: GpioLevel) -> GpioResult<()> {
        // Like the real latch, writing an input is kept and shows once it becomes an output.
        self.state.borrow_mut().pin_mut(index)?.latch = level;
        Ok(())
    }

    fn read(&self, index: usize) -> GpioResult<GpioLevel> {
        let mut state = self.state.borrow_mut();
        state.apply_due();
        state.level(index)
    }

    fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let mut state = self.state.borrow_mut();
        state.now += duration;
        state.sleeps += 1;
        state.apply_due();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROW: usize = 4;
    const COLUMN: usize = 17;

    fn column_pulled_up(sim: &SimGpioDriver) {
        sim.set_mode(COLUMN, GpioMode::Input).unwrap();
        sim.set_bias(COLUMN, GpioBias::PullUp).unwrap();
    }

    #[test]
    fn open_switch_reads_bias() {
        let sim = SimGpioDriver::new(28);
        column_pulled_up(&sim);
        assert_eq!(sim.read(COLUMN), Ok(GpioLevel::High));

        sim.set_bias(COLUMN, GpioBias::PullDown).unwrap();
        assert_eq!(sim.read(COLUMN), Ok(GpioLevel::Low));

        sim.set_bias(COLUMN, GpioBias::None).unwrap();
        assert_eq!(sim.read(COLUMN), Ok(GpioLevel::High));
    }

    #[test]
    fn closed_switch_follows_driven_row() {
        let sim = SimGpioDriver::new(28);
        column_pulled_up(&sim);
        sim.press_key(ROW, COLUMN);

        // Row still floating
        assert_eq!(sim.read(COLUMN), Ok(GpioLevel::High));

        sim.set_mode(ROW, GpioMode::Output).unwrap();
        sim.write(ROW, GpioLevel::Low).unwrap();
        assert_eq!(sim.read(COLUMN), Ok(GpioLevel::Low));

        sim.write(ROW, GpioLevel::High).unwrap();
        assert_eq!(sim.read(COLUMN), Ok(GpioLevel::High));

        sim.write(ROW, GpioLevel::Low).unwrap();
        sim.release_key(ROW, COLUMN);
        assert_eq!(sim.read(COLUMN), Ok(GpioLevel::High));
    }

    #[test]
    fn scheduled_switch_changes_follow_virtual_clock() {
        let sim = SimGpioDriver::new(28);
        column_pulled_up(&sim);
        sim.set_mode(ROW, GpioMode::Output).unwrap();
        sim.write(ROW, GpioLevel::Low).unwrap();

        sim.press_key_at(Duration::from_millis(30), ROW, COLUMN);
        sim.release_key_at(Duration::from_millis(50), ROW, COLUMN);

        sim.sleep(Duration::from_millis(20));
        assert_eq!(sim.read(COLUMN), Ok(GpioLevel::High));
        sim.sleep(Duration::from_millis(20));
        assert_eq!(sim.read(COLUMN), Ok(GpioLevel::Low));
        sim.sleep(Duration::from_millis(20));
        assert_eq!(sim.read(COLUMN), Ok(GpioLevel::High));

        assert_eq!(sim.elapsed(), Duration::from_millis(60));
        assert_eq!(sim.sleep_count(), 3);
    }

    #[test]
    fn zero_sleep_is_not_counted() {
        let sim = SimGpioDriver::new(2);
        sim.sleep(Duration::ZERO);
        assert_eq!(sim.sleep_count(), 0);
        assert_eq!(sim.elapsed(), Duration::ZERO);
    }

    #[test]
    fn invalid_and_faulty_pins() {
        let sim = SimGpioDriver::new(28);
        assert_eq!(sim.read(28), Err(GpioError::InvalidArgument));
        assert_eq!(sim.set_mode(99, GpioMode::Output), Err(GpioError::InvalidArgument));
        assert_eq!(sim.claim(28), Err(GpioError::InvalidArgument));

        sim.inject_read_fault(3);
        assert_eq!(sim.set_bias(3, GpioBias::PullUp), Ok(()));
        assert_eq!(sim.read(3), Err(GpioError::Io(ErrorKind::PermissionDenied)));
    }

    #[test]
    fn output_reads_back_latch() {
        let sim = SimGpioDriver::new(8);
        sim.write(2, GpioLevel::Low).unwrap();
        assert_eq!(sim.read(2), Ok(GpioLevel::High));
        sim.set_mode(2, GpioMode::Output).unwrap();
        assert_eq!(sim.read(2), Ok(GpioLevel::Low));
        assert_eq!(sim.mode(2), Some(GpioMode::Output));
    }
}
