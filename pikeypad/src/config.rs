use std::env::var_os;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use eyre::WrapErr;
use serde::{Serialize, Deserialize};
use pikeypad_gpio::keypad::{KeypadResult, ScanTiming, SymbolTable};

/// Keypad layout and timing, stored as JSON.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// One string per keypad row, one character per key.
    pub layout: Vec<String>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

fn default_debounce_ms() -> u64 {
    ScanTiming::DEFAULT_DEBOUNCE_DELAY.as_millis() as u64
}

fn default_poll_ms() -> u64 {
    ScanTiming::DEFAULT_POLL_INTERVAL.as_millis() as u64
}

impl Config {
    pub fn path() -> PathBuf {
        let config_str = var_os("CONFIG_FILE");
        let config_str: &OsStr = config_str.as_deref().unwrap_or(OsStr::new("keypad.json"));
        PathBuf::from(config_str)
    }

    pub fn try_load() -> eyre::Result<Option<Self>> {
        Self::try_load_from(&Self::path())
    }

    /// Loads the config, or `None` if there is no file at `config_path`.
    ///
    /// A file that exists but can't be read or parsed is an error.
    pub fn try_load_from(config_path: &Path) -> eyre::Result<Option<Self>> {
        if !config_path.exists() {
            return Ok(None);
        }

        let file = std::fs::File::open(config_path)
            .wrap_err_with(|| format!("Failed to open {}", config_path.display()))?;
        let reader = std::io::BufReader::new(file);
        let config = serde_json::from_reader(reader)
            .wrap_err_with(|| format!("Invalid config in {}", config_path.display()))?;
        Ok(Some(config))
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, config_path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::create(config_path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.layout.len()
    }

    pub fn column_count(&self) -> usize {
        self.layout.first().map_or(0, |row| row.chars().count())
    }

    pub fn symbol_table(&self) -> KeypadResult<SymbolTable> {
        let rows: Vec<&str> = self.layout.iter().map(String::as_str).collect();
        SymbolTable::from_rows(&rows)
    }

    pub fn timing(&self) -> ScanTiming {
        ScanTiming::new(
            Duration::from_millis(self.debounce_ms),
            Duration::from_millis(self.poll_ms),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            layout: ["123A", "456B", "789C", "*0#D"].map(String::from).to_vec(),
            debounce_ms: default_debounce_ms(),
            poll_ms: default_poll_ms(),
        }
    }
}
