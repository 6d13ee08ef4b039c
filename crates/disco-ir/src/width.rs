//! Runtime bit-widths.
//!
//! Values are checked at construction time instead of being proven equal by
//! the type system. A `Width` is always in `1..=64`.

use std::fmt;

use crate::{Result, WidthError};

/// Bit-width of a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Width(u8);

impl Width {
    /// Single bit (flags, comparison results).
    pub const W1: Self = Self(1);
    pub const W8: Self = Self(8);
    pub const W16: Self = Self(16);
    pub const W32: Self = Self(32);
    pub const W64: Self = Self(64);

    /// Create a width, rejecting 0 and anything above 64 bits.
    pub const fn new(bits: u8) -> Result<Self> {
        if bits == 0 || bits > 64 {
            return Err(WidthError::Unsupported(bits));
        }
        Ok(Self(bits))
    }

    /// Width covering `bytes` bytes.
    pub fn from_bytes(bytes: u64) -> Result<Self> {
        let bits = bytes
            .checked_mul(8)
            .and_then(|b| u8::try_from(b).ok())
            .ok_or(WidthError::Unsupported(u8::MAX))?;
        Self::new(bits)
    }

    /// Number of bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Number of whole bytes (rounded up).
    pub const fn bytes(self) -> u64 {
        (self.0 as u64).div_ceil(8)
    }

    /// Mask with the low `bits` bits set.
    pub const fn mask(self) -> u64 {
        if self.0 >= 64 {
            u64::MAX
        } else {
            (1u64 << self.0) - 1
        }
    }

    /// Truncate a raw value to this width.
    pub const fn truncate(self, value: u64) -> u64 {
        value & self.mask()
    }

    /// Interpret the low bits of `value` as a signed number.
    pub const fn sign_extend(self, value: u64) -> i64 {
        let shift = 64 - self.0 as u32;
        (value << shift).cast_signed() >> shift
    }

    /// Require `other` to equal `self`.
    pub const fn expect(self, other: Self) -> Result<()> {
        if self.0 == other.0 {
            Ok(())
        } else {
            Err(WidthError::Mismatch {
                expected: self.0,
                actual: other.0,
            })
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_bounds() {
        assert!(Width::new(0).is_err());
        assert!(Width::new(65).is_err());
        assert_eq!(Width::new(64).unwrap(), Width::W64);
        assert_eq!(Width::from_bytes(4).unwrap(), Width::W32);
    }

    #[test]
    fn test_mask_and_sign_extend() {
        assert_eq!(Width::W8.mask(), 0xFF);
        assert_eq!(Width::W64.mask(), u64::MAX);
        assert_eq!(Width::W8.sign_extend(0xF8), -8);
        assert_eq!(Width::W64.sign_extend(0xFFFF_FFFF_FFFF_FFF8), -8);
        assert_eq!(Width::W32.sign_extend(0x7FFF_FFFF), 0x7FFF_FFFF);
    }

    #[test]
    fn test_expect_mismatch() {
        let err = Width::W64.expect(Width::W32).unwrap_err();
        assert_eq!(
            err,
            WidthError::Mismatch {
                expected: 64,
                actual: 32
            }
        );
    }
}
