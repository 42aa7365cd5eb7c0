use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use log::{debug, trace, warn};
use crate::{GpioBias, GpioDriver, GpioLevel, GpioMode, GpioResult};
use crate::keypad::{KeyCoordinate, Keypad, KeypadError, KeypadResult, PinAssignment, PinRole, ScanTiming};

/// The `GpioKeypad` struct represents a row/column switch matrix wired straight to GPIO pins.
///
/// Rows are strobed one at a time by driving them low; columns are inputs with pull-ups, so a
/// closed switch pulls its column low while its row is driven.
///
/// Configuration methods take `&mut self` and scanning takes `&self`, so the pins and timing
/// cannot change under a scan in progress.
pub struct GpioKeypad<'a> {
    gpio: &'a dyn GpioDriver,
    row_count: usize,
    column_count: usize,
    pins: Option<PinAssignment>,
    timing: ScanTiming,
}

impl Debug for GpioKeypad<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpioKeypad({:?}, {}x{}, {:?})", self.gpio, self.row_count, self.column_count, self.pins)
    }
}

impl Display for GpioKeypad<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (rows, columns) = match &self.pins {
            Some(pins) => (pins.rows(), pins.columns()),
            None => (&[][..], &[][..]),
        };
        writeln!(f, "Row size:       {}", self.row_count)?;
        writeln!(f, "Column size:    {}", self.column_count)?;
        writeln!(f, "Row pins:       {:?}", rows)?;
        writeln!(f, "Column pins:    {:?}", columns)?;
        writeln!(f, "Debounce delay: {:?}", self.timing.debounce_delay)?;
        write!(f, "Polling delay:  {:?}", self.timing.poll_interval)
    }
}

impl<'a> GpioKeypad<'a> {
    /// Creates a keypad with `row_count` rows and `column_count` columns and default timing.
    ///
    /// Pins have to be assigned with [GpioKeypad::configure] before scanning.
    pub fn new(gpio: &'a dyn GpioDriver, row_count: usize, column_count: usize) -> Self {
        GpioKeypad {
            gpio,
            row_count,
            column_count,
            pins: None,
            timing: ScanTiming::default(),
        }
    }

    pub fn with_pins(mut self, rows: &[usize], columns: &[usize]) -> KeypadResult<Self> {
        self.configure(rows, columns)?;
        Ok(self)
    }

    pub fn with_timing(mut self, timing: ScanTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_debounce_delay(mut self, delay: Duration) -> Self {
        self.timing.debounce_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.timing.poll_interval = interval;
        self
    }

    /// Assigns the row and column pins.
    ///
    /// The pins are claimed from the driver; pins of a previous assignment that are no longer used
    /// are released. Nothing is written to the hardware until the next scan.
    ///
    /// # Errors
    /// - `KeypadError::PinCountMismatch` if the lists don't match the keypad size.
    /// - `KeypadError::DuplicatePin` if a pin appears twice.
    /// - `KeypadError::Gpio` if the driver refuses a pin. The previous assignment is kept.
    pub fn configure(&mut self, rows: &[usize], columns: &[usize]) -> KeypadResult<()> {
        if rows.len() != self.row_count {
            return Err(KeypadError::PinCountMismatch {
                role: PinRole::Row,
                expected: self.row_count,
                actual: rows.len(),
            });
        }
        if columns.len() != self.column_count {
            return Err(KeypadError::PinCountMismatch {
                role: PinRole::Column,
                expected: self.column_count,
                actual: columns.len(),
            });
        }

        let assignment = PinAssignment::new(rows, columns)?;

        let mut claimed = Vec::new();
        for pin in assignment.iter() {
            if self.owns(pin) {
                continue;
            }
            if let Err(err) = self.gpio.claim(pin) {
                for &pin in &claimed {
                    self.gpio.release(pin);
                }
                return Err(err.into());
            }
            claimed.push(pin);
        }

        if let Some(old) = self.pins.take() {
            for pin in old.iter().filter(|&pin| !assignment.contains(pin)) {
                self.gpio.release(pin);
            }
        }

        debug!("Keypad pins set: rows {:?}, columns {:?}", assignment.rows(), assignment.columns());
        self.pins = Some(assignment);
        Ok(())
    }

    fn owns(&self, pin: usize) -> bool {
        self.pins.as_ref().is_some_and(|pins| pins.contains(pin))
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn pins(&self) -> Option<&PinAssignment> {
        self.pins.as_ref()
    }

    pub fn timing(&self) -> ScanTiming {
        self.timing
    }

    pub fn set_timing(&mut self, timing: ScanTiming) {
        self.timing = timing;
    }

    pub fn debounce_delay(&self) -> Duration {
        self.timing.debounce_delay
    }

    /// Sets the settle time after a press is seen. Zero reports the key immediately.
    pub fn set_debounce_delay(&mut self, delay: Duration) {
        self.timing.debounce_delay = delay;
    }

    pub fn poll_interval(&self) -> Duration {
        self.timing.poll_interval
    }

    /// Sets the pause after each row without a press. Zero scans back to back.
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.timing.poll_interval = interval;
    }

    /// Blocks until a key is pressed and returns its position.
    ///
    /// If several keys are held, the first one in row-major order wins. There is no timeout;
    /// see [GpioKeypad::scan_until] and [GpioKeypad::scan_cancellable] for bounded variants.
    ///
    /// # Errors
    /// - `KeypadError::PinsUnconfigured` if no pins were assigned.
    /// - `KeypadError::Gpio` on any driver failure. Not retried.
    pub fn scan(&self) -> KeypadResult<KeyCoordinate> {
        loop {
            if let Some(key) = self.scan_while(|| true)? {
                return Ok(key);
            }
        }
    }

    /// Like [GpioKeypad::scan], but gives up with `None` once `deadline` has passed.
    ///
    /// The deadline is checked after every row without a press, so at least one row is scanned.
    pub fn scan_until(&self, deadline: Instant) -> KeypadResult<Option<KeyCoordinate>> {
        self.scan_while(|| Instant::now() < deadline)
    }

    /// Like [GpioKeypad::scan], but gives up with `None` once `cancel` is set, e.g. from another thread.
    ///
    /// The flag is checked after every row without a press, so at least one row is scanned.
    pub fn scan_cancellable(&self, cancel: &AtomicBool) -> KeypadResult<Option<KeyCoordinate>> {
        self.scan_while(|| !cancel.load(Ordering::Relaxed))
    }

    fn scan_while(&self, mut keep_scanning: impl FnMut() -> bool) -> KeypadResult<Option<KeyCoordinate>> {
        let pins = self.pins.as_ref().ok_or(KeypadError::PinsUnconfigured)?;
        trace!("Scanning keypad {:?}", pins);

        self.prepare(pins)?;

        loop {
            for (row, &row_pin) in pins.rows().iter().enumerate() {
                if let Some(column) = self.strobe_row(row_pin, pins.columns())? {
                    let key = KeyCoordinate::new(row, column);
                    debug!("Key pressed at {}", key);
                    return Ok(Some(key));
                }

                self.gpio.sleep(self.timing.poll_interval);

                if !keep_scanning() {
                    trace!("Scan stopped without a key press");
                    return Ok(None);
                }
            }
        }
    }

    /// Columns become pulled-up inputs and all rows float.
    fn prepare(&self, pins: &PinAssignment) -> GpioResult<()> {
        for &pin in pins.columns() {
            self.gpio.set_mode(pin, GpioMode::Input)?;
            self.gpio.set_bias(pin, GpioBias::PullUp)?;
        }
        for &pin in pins.rows() {
            float(self.gpio, pin)?;
        }
        Ok(())
    }

    /// Drives one row low and returns the first column reading low.
    ///
    /// The row floats again when this returns, whether a key was found or not.
    fn strobe_row(&self, row_pin: usize, columns: &[usize]) -> GpioResult<Option<usize>> {
        let row = DrivenRow::drive(self.gpio, row_pin)?;

        for (column, &column_pin) in columns.iter().enumerate() {
            if self.gpio.read(column_pin)?.is_low() {
                // The initial transition is trusted; no re-read after settling.
                self.gpio.sleep(self.timing.debounce_delay);
                row.release()?;
                return Ok(Some(column));
            }
        }

        row.release()?;
        Ok(None)
    }
}

impl Drop for GpioKeypad<'_> {
    fn drop(&mut self) {
        if let Some(pins) = &self.pins {
            for pin in pins.iter() {
                self.gpio.release(pin);
            }
        }
    }
}

impl Keypad for GpioKeypad<'_> {
    type Key = KeyCoordinate;

    fn wait_key(&self) -> KeypadResult<KeyCoordinate> {
        self.scan()
    }
}

fn float(gpio: &dyn GpioDriver, pin: usize) -> GpioResult<()> {
    gpio.set_mode(pin, GpioMode::Input)?;
    gpio.set_bias(pin, GpioBias::None)
}

/// A row pin driven low. Floats the pin again when released or dropped.
struct DrivenRow<'a> {
    gpio: &'a dyn GpioDriver,
    pin: usize,
    released: bool,
}

impl<'a> DrivenRow<'a> {
    fn drive(gpio: &'a dyn GpioDriver, pin: usize) -> GpioResult<Self> {
        trace!("Driving row pin {}", pin);
        gpio.set_mode(pin, GpioMode::Output)?;
        let row = DrivenRow { gpio, pin, released: false };
        gpio.write(pin, GpioLevel::Low)?;
        Ok(row)
    }

    fn release(mut self) -> GpioResult<()> {
        self.released = true;
        float(self.gpio, self.pin)
    }
}

impl Drop for DrivenRow<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = float(self.gpio, self.pin) {
                warn!("Failed to release row pin {}: {}", self.pin, err);
            }
        }
    }
}
