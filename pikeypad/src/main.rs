mod config;

use std::env::var;
use dotenv::dotenv;
use log::{debug, info, warn};
use sysinfo::System;
use pikeypad_gpio::GpioDriver;
use pikeypad_gpio::keypad::{GpioKeypad, Keypad, KeypadErrorKind, SymbolKeypad};
use pikeypad_gpio::raw::RawGpioDriver;
use crate::config::Config;

fn parse_pin_list(pin_str: &str) -> eyre::Result<Vec<usize>> {
    let pins = pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()?;

    if pins.is_empty() {
        return Err(eyre::eyre!("No pins given"));
    }
    Ok(pins)
}

fn open_gpio() -> eyre::Result<RawGpioDriver> {
    let device = var("PIKEYPAD_GPIO_DEVICE").unwrap_or_else(|_| "gpiomem".to_string());
    let gpio = match device.as_str() {
        "gpiomem" => RawGpioDriver::new_gpiomem()?,
        "mem" => RawGpioDriver::new_mem()?,
        other => return Err(eyre::eyre!("Unknown GPIO device {:?}, expected gpiomem or mem", other)),
    };
    Ok(gpio)
}

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!("PiKeypad v.{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Running on {} ({}), kernel {}",
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR),
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );

    // Get pin numbers from env
    let row_pins = parse_pin_list(&var("PIKEYPAD_PINS_ROWS")?)?;
    let col_pins = parse_pin_list(&var("PIKEYPAD_PINS_COLS")?)?;
    info!("Keypad @ Rows: {:?}, Cols: {:?}", row_pins, col_pins);

    debug!("Trying to load config...");
    let config = if let Some(config) = Config::try_load()? {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save()?;
        info!("Default config saved to {}.", Config::path().display());
        config
    };

    debug!("Initializing GPIO driver...");
    let gpio = open_gpio()?;
    debug!("{:?} initialized, {} pins.", gpio, gpio.count()?);

    debug!("Initializing keypad driver...");
    let scanner = GpioKeypad::new(&gpio, config.row_count(), config.column_count())
        .with_timing(config.timing())
        .with_pins(&row_pins, &col_pins)?;
    debug!("Keypad details:\n{}", scanner);

    let keypad = SymbolKeypad::new(scanner).with_symbol_table(config.symbol_table()?)?;
    let keypad: &dyn Keypad<Key = char> = &keypad;

    info!("Waiting for keys...");
    loop {
        match keypad.wait_key() {
            Ok(key) => info!("Key pressed: {}", key),
            Err(err) if err.kind() == KeypadErrorKind::UnconfiguredLookup => {
                warn!("Key press without symbol: {}", err);
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_lists_accept_mixed_separators() {
        assert_eq!(parse_pin_list("5, 6;13 19").unwrap(), vec![5, 6, 13, 19]);
        assert_eq!(parse_pin_list(" 12,,16 ").unwrap(), vec![12, 16]);
    }

    #[test]
    fn pin_lists_reject_garbage() {
        assert!(parse_pin_list("5, six").is_err());
        assert!(parse_pin_list(" ;, ").is_err());
        assert!(parse_pin_list("-1").is_err());
    }
}
