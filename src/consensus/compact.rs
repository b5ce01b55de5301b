//! Compact target ("nBits") codec
//! 
//! A 256-bit target is carried on the wire as 32 bits: the top byte is the
//! byte length of the magnitude, the low 23 bits the leading mantissa
//! bytes and bit 23 a sign flag. Pure integer arithmetic, no floats.

use primitive_types::U256;
use thiserror::Error;

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Errors when a compact value is used as an arithmetic operand
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CompactError {
    #[error("compact target {0:#010x} is negative")]
    Negative(u32),
    #[error("compact target {0:#010x} overflows 256 bits")]
    Overflow(u32),
    #[error("compact target {0:#010x} is zero")]
    Zero(u32),
}

/// Result of decoding a compact value; the flags are reported, not enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedTarget {
    pub target: U256,
    pub negative: bool,
    pub overflow: bool,
}

/// Decode compact `bits` into a 256-bit magnitude plus sign/overflow flags
pub fn decode_compact(bits: u32) -> DecodedTarget {
    let exponent = bits >> 24;
    let mantissa = bits & MANTISSA_MASK;

    let target = if exponent <= 3 {
        U256::from(mantissa >> (8 * (3 - exponent)))
    } else {
        let shift = 8 * (exponent - 3) as usize;
        if shift >= 256 {
            U256::zero()
        } else {
            U256::from(mantissa) << shift
        }
    };

    let negative = mantissa != 0 && (bits & SIGN_BIT) != 0;
    let overflow = mantissa != 0
        && (exponent > 34
            || (mantissa > 0xff && exponent > 33)
            || (mantissa > 0xffff && exponent > 32));

    DecodedTarget {
        target,
        negative,
        overflow,
    }
}

/// Encode a 256-bit magnitude as compact `bits`
pub fn encode_compact(target: U256) -> u32 {
    let mut size = (target.bits() as u32 + 7) / 8;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (target >> (8 * (size - 3)) as usize).low_u32()
    };

    // The mantissa's top bit doubles as the sign flag; move it into the exponent.
    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }

    debug_assert!(compact & !MANTISSA_MASK == 0);
    debug_assert!(size < 256);

    compact | (size << 24)
}

/// Decode `bits` for use in arithmetic, rejecting negative, overflowing and zero targets
pub fn target_from_compact(bits: u32) -> Result<U256, CompactError> {
    let decoded = decode_compact(bits);
    if decoded.negative {
        return Err(CompactError::Negative(bits));
    }
    if decoded.overflow {
        return Err(CompactError::Overflow(bits));
    }
    if decoded.target.is_zero() {
        return Err(CompactError::Zero(bits));
    }
    Ok(decoded.target)
}

/// Expected number of hashes to meet `bits`: 2^256 / (target + 1)
/// 
/// Zero for unusable encodings, so they never add chain work.
pub fn block_proof(bits: u32) -> U256 {
    let target = match target_from_compact(bits) {
        Ok(target) => target,
        Err(_) => return U256::zero(),
    };
    // 2^256 / (t + 1) == (~t / (t + 1)) + 1
    (!target / (target + U256::one())) + U256::one()
}
