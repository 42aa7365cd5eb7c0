mod gpio;
mod symbols;

use std::collections::HashSet;
use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;
use thiserror::Error;
use crate::GpioError;
pub use gpio::*;
pub use symbols::*;

/// The `Keypad` trait defines the interface for keypad input devices.
pub trait Keypad: Debug {
    type Key;

    /// Blocks until a key is pressed and returns it.
    fn wait_key(&self) -> KeypadResult<Self::Key>;
}

/// Position of a key in the matrix, zero-based.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct KeyCoordinate {
    pub row: usize,
    pub column: usize,
}

impl KeyCoordinate {
    pub fn new(row: usize, column: usize) -> Self {
        KeyCoordinate { row, column }
    }

    /// Checks whether this is the key at `row` and `column`.
    ///
    /// Lets a single scan result be compared against several candidates without scanning again.
    pub fn is_at(&self, row: usize, column: usize) -> bool {
        self.row == row && self.column == column
    }
}

impl Display for KeyCoordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// Whether a pin drives a row or senses a column.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PinRole {
    Row,
    Column,
}

impl Display for PinRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PinRole::Row => "row",
            PinRole::Column => "column",
        })
    }
}

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum KeypadError {
    #[error("expected {expected} {role} pins, got {actual}")]
    PinCountMismatch {
        role: PinRole,
        expected: usize,
        actual: usize,
    },
    #[error("keypad needs at least one row and one column")]
    EmptyMatrix,
    #[error("pin {0} is assigned more than once")]
    DuplicatePin(usize),
    #[error("keypad pins are not configured")]
    PinsUnconfigured,
    #[error("symbol table rows have different lengths")]
    RaggedSymbolTable,
    #[error("symbol table is {rows}x{columns}, but the keypad is {expected_rows}x{expected_columns}")]
    SymbolTableMismatch {
        rows: usize,
        columns: usize,
        expected_rows: usize,
        expected_columns: usize,
    },
    #[error("no symbol table is set")]
    NoSymbolTable,
    #[error("no symbol at {0}")]
    NoSymbolAt(KeyCoordinate),
    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),
}

/// Broad category of a [KeypadError].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeypadErrorKind {
    /// The keypad or its symbol table was set up inconsistently. Raised by the setter.
    Configuration,
    /// A symbol was requested that the current table cannot provide.
    UnconfiguredLookup,
    /// The GPIO backend failed. Never retried by the keypad.
    HardwareAccess,
}

impl KeypadError {
    pub fn kind(&self) -> KeypadErrorKind {
        use KeypadError::*;

        match self {
            PinCountMismatch { .. }
            | EmptyMatrix
            | DuplicatePin(_)
            | PinsUnconfigured
            | RaggedSymbolTable
            | SymbolTableMismatch { .. } => KeypadErrorKind::Configuration,
            NoSymbolTable | NoSymbolAt(_) => KeypadErrorKind::UnconfiguredLookup,
            Gpio(_) => KeypadErrorKind::HardwareAccess,
        }
    }
}

pub type KeypadResult<T> = Result<T, KeypadError>;

/// The row and column pins of a keypad, all distinct.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PinAssignment {
    rows: Vec<usize>,
    columns: Vec<usize>,
}

impl PinAssignment {
    pub fn new(rows: impl Into<Vec<usize>>, columns: impl Into<Vec<usize>>) -> KeypadResult<Self> {
        let rows = rows.into();
        let columns = columns.into();

        if rows.is_empty() || columns.is_empty() {
            return Err(KeypadError::EmptyMatrix);
        }

        let mut seen = HashSet::new();
        if let Some(&pin) = rows.iter().chain(&columns).find(|&&pin| !seen.insert(pin)) {
            return Err(KeypadError::DuplicatePin(pin));
        }

        Ok(PinAssignment { rows, columns })
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Iterates over all pins, rows first.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows.iter().chain(&self.columns).copied()
    }

    pub fn contains(&self, pin: usize) -> bool {
        self.iter().any(|p| p == pin)
    }
}

/// Delays used while scanning.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ScanTiming {
    /// Settle time after a closed contact is first seen, before the key is reported.
    pub debounce_delay: Duration,
    /// Pause after every row that had no key pressed.
    pub poll_interval: Duration,
}

impl ScanTiming {
    pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(200);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

    pub fn new(debounce_delay: Duration, poll_interval: Duration) -> Self {
        ScanTiming { debounce_delay, poll_interval }
    }
}

impl Default for ScanTiming {
    fn default() -> Self {
        ScanTiming::new(Self::DEFAULT_DEBOUNCE_DELAY, Self::DEFAULT_POLL_INTERVAL)
    }
}
