//! GPIO access by mapping the BCM GPIO register block into memory.

use crate::claims::PinClaims;
use crate::{GpioBias, GpioDriver, GpioError, GpioLevel, GpioMode, GpioResult};
use log::trace;
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;

/// Register offsets inside the GPIO block, in bytes.
mod reg {
    pub const GPFSEL0: usize = 0x00;
    pub const GPSET0: usize = 0x1c;
    pub const GPCLR0: usize = 0x28;
    pub const GPLEV0: usize = 0x34;
    // GPIO_PUP_PDN_CNTRL_REG0 (yes that is a long name)
    pub const GPIO_PUP_PDN_CNTRL_REG0: usize = 0xe4;
}

const FUNCTION_INPUT: u32 = 0b000;
const FUNCTION_OUTPUT: u32 = 0b001;

pub struct RawGpioDriver {
    mmap: MmapRaw,
    claims: PinClaims,
}

impl RawGpioDriver {
    // 0x7e200000 on the bus; BCM2711 (Pi 4) low-peripheral base as seen by /dev/mem.
    // Older chips have neither this base nor the pull control registers used by `set_bias`.
    const GPIO_BASE: u64 = 0xFE20_0000;
    const BLOCK_LEN: usize = 4096;

    const PIN_COUNT: usize = 58;

    fn create(path: &str, offset: u64) -> GpioResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        let mmap = MmapOptions::new()
            .offset(offset)
            .len(Self::BLOCK_LEN)
            .map_raw(&file)?;

        Ok(RawGpioDriver {
            mmap,
            claims: PinClaims::new(Self::PIN_COUNT),
        })
    }

    /// Opens `/dev/gpiomem`, which exposes only the GPIO block and needs no root.
    pub fn new_gpiomem() -> GpioResult<Self> {
        Self::create("/dev/gpiomem", 0)
    }

    /// Opens `/dev/mem` at the BCM2711 GPIO base. Requires root.
    pub fn new_mem() -> GpioResult<Self> {
        Self::create("/dev/mem", Self::GPIO_BASE)
    }

    fn check_pin(index: usize) -> GpioResult<()> {
        if index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }
        Ok(())
    }

    /// Pointer to the 32-bit word at `offset` bytes plus `word` words into the block.
    fn register(&self, offset: usize, word: usize) -> *mut u32 {
        let base = self.mmap.as_mut_ptr() as *mut u32;
        // SAFETY: every offset used stays well within the mapped 4 KiB block.
        unsafe { base.add(offset / 4 + word) }
    }

    fn read_register(&self, offset: usize, word: usize) -> u32 {
        // SAFETY: the mapping lives as long as `self`; device memory needs volatile access.
        unsafe { self.register(offset, word).read_volatile() }
    }

    fn write_register(&self, offset: usize, word: usize, value: u32) {
        // SAFETY: see `read_register`.
        unsafe { self.register(offset, word).write_volatile(value) }
    }

    /// Replaces `width` bits of a packed per-pin field, leaving the other pins untouched.
    fn modify_field(&self, offset: usize, index: usize, width: usize, value: u32) {
        let (word, shift) = field_position(index, width);
        let mask = ((1u32 << width) - 1) << shift;

        let current = self.read_register(offset, word);
        self.write_register(offset, word, (current & !mask) | (value << shift));
    }
}

/// Word and bit shift of pin `index` in a register array packing `width` bits per pin.
fn field_position(index: usize, width: usize) -> (usize, usize) {
    let per_word = 32 / width;
    (index / per_word, (index % per_word) * width)
}

impl Debug for RawGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawGpioDriver({:?})", self.mmap.as_ptr().addr())
    }
}

impl GpioDriver for RawGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(Self::PIN_COUNT)
    }

    fn claim(&self, index: usize) -> GpioResult<()> {
        self.claims.claim(index)
    }

    fn release(&self, index: usize) {
        self.claims.release(index);
    }

    fn set_mode(&self, index: usize, mode: GpioMode) -> GpioResult<()> {
        Self::check_pin(index)?;
        let function = match mode {
            GpioMode::Input => FUNCTION_INPUT,
            GpioMode::Output => FUNCTION_OUTPUT,
        };
        self.modify_field(reg::GPFSEL0, index, 3, function);
        trace!("Set pin function: pin={} function={:#05b}", index, function);
        Ok(())
    }

    fn set_bias(&self, index: usize, bias: GpioBias) -> GpioResult<()> {
        Self::check_pin(index)?;
        let value = match bias {
            GpioBias::None => 0b00,
            GpioBias::PullUp => 0b01,
            GpioBias::PullDown => 0b10,
        };
        self.modify_field(reg::GPIO_PUP_PDN_CNTRL_REG0, index, 2, value);
        Ok(())
    }

    fn write(&self, index: usize, level: GpioLevel) -> GpioResult<()> {
        Self::check_pin(index)?;
        // GPSETn/GPCLRn are write-1-to-act; zero bits leave other pins alone.
        let offset = match level {
            GpioLevel::High => reg::GPSET0,
            GpioLevel::Low => reg::GPCLR0,
        };
        self.write_register(offset, index / 32, 1 << (index % 32));
        Ok(())
    }

    fn read(&self, index: usize) -> GpioResult<GpioLevel> {
        Self::check_pin(index)?;
        let value = self.read_register(reg::GPLEV0, index / 32);
        Ok(GpioLevel::from((value >> (index % 32)) & 1 != 0))
    }
}
