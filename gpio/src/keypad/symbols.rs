use std::fmt::Debug;
use log::debug;
use crate::keypad::{GpioKeypad, KeyCoordinate, Keypad, KeypadError, KeypadResult};

/// A rectangular table of symbols, one per key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SymbolTable<S = char> {
    symbols: Vec<S>,
    row_count: usize,
    column_count: usize,
}

impl<S: Copy> SymbolTable<S> {
    /// Builds a table from its rows.
    ///
    /// # Errors
    /// - `KeypadError::RaggedSymbolTable` if the rows don't all have the same length.
    pub fn new(rows: Vec<Vec<S>>) -> KeypadResult<Self> {
        let row_count = rows.len();
        let column_count = rows.first().map_or(0, Vec::len);

        if rows.iter().any(|row| row.len() != column_count) {
            return Err(KeypadError::RaggedSymbolTable);
        }

        Ok(SymbolTable {
            symbols: rows.into_iter().flatten().collect(),
            row_count,
            column_count,
        })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Gets the symbol at `key`, or `None` if it lies outside the table.
    pub fn get(&self, key: KeyCoordinate) -> Option<S> {
        if key.row < self.row_count && key.column < self.column_count {
            Some(self.symbols[key.row * self.column_count + key.column])
        } else {
            None
        }
    }
}

impl SymbolTable<char> {
    /// Builds a character table with one string per row.
    pub fn from_rows(rows: &[&str]) -> KeypadResult<Self> {
        Self::new(rows.iter().map(|row| row.chars().collect()).collect())
    }

    /// The usual 4x4 membrane keypad layout.
    pub fn telephone() -> Self {
        const KEYS: [[char; 4]; 4] = [
            ['1', '2', '3', 'A'],
            ['4', '5', '6', 'B'],
            ['7', '8', '9', 'C'],
            ['*', '0', '#', 'D'],
        ];

        SymbolTable {
            symbols: KEYS.iter().flatten().copied().collect(),
            row_count: 4,
            column_count: 4,
        }
    }
}

/// A [GpioKeypad] that reports symbols instead of coordinates.
///
/// The symbol table is optional; without it the coordinate helpers still work and only
/// [SymbolKeypad::get_key] fails.
pub struct SymbolKeypad<'a, S = char> {
    scanner: GpioKeypad<'a>,
    table: Option<SymbolTable<S>>,
}

impl<S: Debug> Debug for SymbolKeypad<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymbolKeypad({:?}, {:?})", self.scanner, self.table)
    }
}

impl<'a, S: Copy> SymbolKeypad<'a, S> {
    pub fn new(scanner: GpioKeypad<'a>) -> Self {
        SymbolKeypad { scanner, table: None }
    }

    pub fn with_symbol_table(mut self, table: SymbolTable<S>) -> KeypadResult<Self> {
        self.set_symbol_table(table)?;
        Ok(self)
    }

    pub fn scanner(&self) -> &GpioKeypad<'a> {
        &self.scanner
    }

    pub fn scanner_mut(&mut self) -> &mut GpioKeypad<'a> {
        &mut self.scanner
    }

    pub fn symbol_table(&self) -> Option<&SymbolTable<S>> {
        self.table.as_ref()
    }

    /// Replaces the symbol table.
    ///
    /// # Errors
    /// - `KeypadError::SymbolTableMismatch` if the table size differs from the keypad size.
    ///   The previous table is kept.
    pub fn set_symbol_table(&mut self, table: SymbolTable<S>) -> KeypadResult<()> {
        let expected_rows = self.scanner.row_count();
        let expected_columns = self.scanner.column_count();

        if table.row_count() != expected_rows || table.column_count() != expected_columns {
            return Err(KeypadError::SymbolTableMismatch {
                rows: table.row_count(),
                columns: table.column_count(),
                expected_rows,
                expected_columns,
            });
        }

        debug!("Symbol table set ({}x{})", expected_rows, expected_columns);
        self.table = Some(table);
        Ok(())
    }

    pub fn clear_symbol_table(&mut self) -> Option<SymbolTable<S>> {
        self.table.take()
    }

    /// Looks up the symbol of a key without touching the hardware.
    pub fn lookup(&self, key: KeyCoordinate) -> KeypadResult<S> {
        let table = self.table.as_ref().ok_or(KeypadError::NoSymbolTable)?;
        table.get(key).ok_or(KeypadError::NoSymbolAt(key))
    }

    /// Blocks until a key is pressed and returns its symbol.
    ///
    /// # Errors
    /// - `KeypadError::NoSymbolTable` if no table is set. Returned before scanning.
    /// - `KeypadError::NoSymbolAt` if the pressed key lies outside the table.
    /// - Any error of [GpioKeypad::scan].
    pub fn get_key(&self) -> KeypadResult<S> {
        let table = self.table.as_ref().ok_or(KeypadError::NoSymbolTable)?;
        let key = self.scanner.scan()?;
        table.get(key).ok_or(KeypadError::NoSymbolAt(key))
    }

    /// Blocks until a key is pressed and checks whether it is the one at `row` and `column`.
    ///
    /// To test one press against several keys, [GpioKeypad::scan] once and use [KeyCoordinate::is_at].
    pub fn is_at(&self, row: usize, column: usize) -> KeypadResult<bool> {
        Ok(self.scanner.scan()?.is_at(row, column))
    }
}

impl<S: Copy + Debug> Keypad for SymbolKeypad<'_, S> {
    type Key = S;

    fn wait_key(&self) -> KeypadResult<S> {
        self.get_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypad::KeypadErrorKind;
    use crate::sim::SimGpioDriver;

    const ROWS: [usize; 4] = [5, 6, 13, 19];
    const COLS: [usize; 4] = [12, 16, 20, 21];

    fn symbol_keypad(sim: &SimGpioDriver) -> SymbolKeypad<'_> {
        let scanner = GpioKeypad::new(sim, 4, 4)
            .with_pins(&ROWS, &COLS)
            .unwrap();
        SymbolKeypad::new(scanner)
    }

    #[test]
    fn table_rejects_ragged_rows() {
        assert_eq!(
            SymbolTable::from_rows(&["123", "45", "789"]),
            Err(KeypadError::RaggedSymbolTable),
        );
    }

    #[test]
    fn table_lookup() {
        let table = SymbolTable::from_rows(&["123", "456"]).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.get(KeyCoordinate::new(1, 2)), Some('6'));
        assert_eq!(table.get(KeyCoordinate::new(0, 1)), Some('2'));
        assert_eq!(table.get(KeyCoordinate::new(2, 0)), None);
        assert_eq!(table.get(KeyCoordinate::new(0, 3)), None);
    }

    #[test]
    fn telephone_layout() {
        let table = SymbolTable::telephone();
        assert_eq!(table, SymbolTable::from_rows(&["123A", "456B", "789C", "*0#D"]).unwrap());
        assert_eq!(table.get(KeyCoordinate::new(3, 0)), Some('*'));
    }

    #[test]
    fn get_key_returns_symbol_at_scanned_key() {
        let sim = SimGpioDriver::new(28);
        sim.press_key(ROWS[2], COLS[1]);
        let keypad = symbol_keypad(&sim)
            .with_symbol_table(SymbolTable::telephone())
            .unwrap();

        assert_eq!(keypad.get_key(), Ok('8'));
    }

    #[test]
    fn get_key_without_table() {
        let sim = SimGpioDriver::new(28);
        sim.press_key(ROWS[0], COLS[0]);
        let keypad = symbol_keypad(&sim);

        let err = keypad.get_key().unwrap_err();
        assert_eq!(err, KeypadError::NoSymbolTable);
        assert_eq!(err.kind(), KeypadErrorKind::UnconfiguredLookup);
    }

    #[test]
    fn get_key_without_table_does_not_wait_for_a_press() {
        let sim = SimGpioDriver::new(28);
        let keypad = symbol_keypad(&sim);

        assert_eq!(keypad.get_key(), Err(KeypadError::NoSymbolTable));
        assert_eq!(sim.elapsed(), std::time::Duration::ZERO);
        assert_eq!(sim.sleep_count(), 0);
        for pin in ROWS.iter().chain(&COLS) {
            assert_eq!(sim.mode(*pin), Some(crate::GpioMode::Input));
        }
    }

    #[test]
    fn lookup_recovers_after_table_is_set() {
        let sim = SimGpioDriver::new(28);
        let mut keypad = symbol_keypad(&sim);
        let key = KeyCoordinate::new(3, 3);

        assert_eq!(keypad.lookup(key), Err(KeypadError::NoSymbolTable));
        keypad.set_symbol_table(SymbolTable::telephone()).unwrap();
        assert_eq!(keypad.lookup(key), Ok('D'));
        assert_eq!(
            keypad.lookup(KeyCoordinate::new(4, 0)),
            Err(KeypadError::NoSymbolAt(KeyCoordinate::new(4, 0))),
        );

        assert_eq!(keypad.clear_symbol_table(), Some(SymbolTable::telephone()));
        assert_eq!(keypad.lookup(key), Err(KeypadError::NoSymbolTable));
    }

    #[test]
    fn table_size_must_match_keypad() {
        let sim = SimGpioDriver::new(28);
        let mut keypad = symbol_keypad(&sim);
        keypad.set_symbol_table(SymbolTable::telephone()).unwrap();

        let err = keypad
            .set_symbol_table(SymbolTable::from_rows(&["123", "456", "789", "*0#"]).unwrap())
            .unwrap_err();
        assert_eq!(
            err,
            KeypadError::SymbolTableMismatch { rows: 4, columns: 3, expected_rows: 4, expected_columns: 4 },
        );
        assert_eq!(err.kind(), KeypadErrorKind::Configuration);
        assert_eq!(keypad.symbol_table(), Some(&SymbolTable::telephone()));
    }

    #[test]
    fn is_at_scans_once() {
        let sim = SimGpioDriver::new(28);
        sim.press_key(ROWS[1], COLS[2]);
        let keypad = symbol_keypad(&sim);

        assert_eq!(keypad.is_at(1, 2), Ok(true));
        assert_eq!(keypad.is_at(2, 1), Ok(false));
        assert_eq!(keypad.is_at(9, 9), Ok(false));
    }

    #[test]
    fn custom_symbol_type() {
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        enum Arrow {
            Up,
            Down,
        }

        let sim = SimGpioDriver::new(28);
        sim.press_key(7, 8);
        let scanner = GpioKeypad::new(&sim, 2, 1).with_pins(&[3, 7], &[8]).unwrap();
        let keypad = SymbolKeypad::new(scanner)
            .with_symbol_table(SymbolTable::new(vec![vec![Arrow::Up], vec![Arrow::Down]]).unwrap())
            .unwrap();
        let keypad: &dyn Keypad<Key = Arrow> = &keypad;

        assert_eq!(keypad.wait_key(), Ok(Arrow::Down));
    }

    #[test]
    fn scanner_is_reachable_for_reconfiguration() {
        let sim = SimGpioDriver::new(28);
        let mut keypad = symbol_keypad(&sim);
        keypad.scanner_mut().set_debounce_delay(std::time::Duration::ZERO);
        assert!(keypad.scanner().debounce_delay().is_zero());
    }
}
