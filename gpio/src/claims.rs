//! Bookkeeping of which pins of a backend are currently owned.

use crate::{GpioError, GpioResult};
use bitvec::vec::BitVec;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU8, Ordering};

/// A fixed-size set of claimed pin indices.
///
/// Uses an atomic bit vector so claims can be taken through a shared reference,
/// the way drivers hand out pins. Claiming is a single test-and-set, so at most one
/// caller wins a pin even when several threads race for it.
pub struct PinClaims {
    used_pins: BitVec<AtomicU8>,
}

impl PinClaims {
    pub fn new(count: usize) -> Self {
        Self {
            used_pins: BitVec::repeat(false, count),
        }
    }

    pub fn count(&self) -> usize {
        self.used_pins.len()
    }

    pub fn is_claimed(&self, index: usize) -> bool {
        self.used_pins.get(index).is_some_and(|bit| *bit)
    }

    pub fn claim(&self, index: usize) -> GpioResult<()> {
        if index >= self.count() {
            return Err(GpioError::InvalidArgument);
        }

        let (byte, mask) = Self::locate(index);
        let previous = self.used_pins.as_raw_slice()[byte].fetch_or(mask, Ordering::AcqRel);
        if previous & mask != 0 {
            return Err(GpioError::AlreadyInUse);
        }
        Ok(())
    }

    pub fn release(&self, index: usize) {
        if index < self.count() {
            let (byte, mask) = Self::locate(index);
            self.used_pins.as_raw_slice()[byte].fetch_and(!mask, Ordering::AcqRel);
        }
    }

    /// Storage byte and bit mask of a pin. `BitVec` defaults to `Lsb0`, so bit 0 is the
    /// least significant bit of the first byte.
    fn locate(index: usize) -> (usize, u8) {
        (index / 8, 1 << (index % 8))
    }
}

impl Debug for PinClaims {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let claimed: Vec<usize> = self.used_pins.iter_ones().collect();
        write!(f, "PinClaims({:?})", claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_and_release() {
        let claims = PinClaims::new(8);
        assert!(!claims.is_claimed(3));
        claims.claim(3).unwrap();
        assert!(claims.is_claimed(3));
        assert_eq!(claims.claim(3), Err(GpioError::AlreadyInUse));
        claims.release(3);
        assert!(!claims.is_claimed(3));
        claims.claim(3).unwrap();
    }

    #[test]
    fn out_of_range() {
        let claims = PinClaims::new(4);
        assert_eq!(claims.claim(4), Err(GpioError::InvalidArgument));
        assert!(!claims.is_claimed(4));
        claims.release(17);
    }

    #[test]
    fn debug_lists_claimed_pins() {
        let claims = PinClaims::new(8);
        claims.claim(1).unwrap();
        claims.claim(6).unwrap();
        assert_eq!(format!("{:?}", claims), "PinClaims([1, 6])");
    }

    #[test]
    fn claims_past_the_first_byte() {
        let claims = PinClaims::new(28);
        claims.claim(8).unwrap();
        claims.claim(27).unwrap();
        assert!(claims.is_claimed(8));
        assert!(claims.is_claimed(27));
        assert!(!claims.is_claimed(0));
        assert!(!claims.is_claimed(26));
        assert_eq!(format!("{:?}", claims), "PinClaims([8, 27])");
        claims.release(8);
        assert_eq!(format!("{:?}", claims), "PinClaims([27])");
    }

    #[test]
    fn racing_claims_have_one_winner() {
        let claims = PinClaims::new(58);

        for pin in [0, 13, 57] {
            let winners = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..8)
                    .map(|_| scope.spawn(|| claims.claim(pin)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap())
                    .filter(Result::is_ok)
                    .count()
            });

            assert_eq!(winners, 1, "pin {}", pin);
            assert!(claims.is_claimed(pin));
        }
    }
}
