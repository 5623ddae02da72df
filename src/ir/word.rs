// src/ir/word.rs
//! 256-bit machine-word arithmetic.
//!
//! All values are unsigned 256-bit integers represented as [`BigUint`];
//! every operation wraps modulo 2^256. Signed variants reinterpret their
//! arguments in two's complement. Division and modulo by zero yield zero.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use std::sync::LazyLock;

pub type Word = BigUint;

pub const WORD_BITS: u32 = 256;
pub const WORD_BYTES: u64 = 32;

static MODULUS: LazyLock<BigUint> = LazyLock::new(|| BigUint::one() << WORD_BITS);
static MASK: LazyLock<BigUint> = LazyLock::new(|| (BigUint::one() << WORD_BITS) - 1u32);
static SIGN_BIT: LazyLock<BigUint> = LazyLock::new(|| BigUint::one() << (WORD_BITS - 1));

pub fn mask() -> &'static BigUint {
    &MASK
}

/// Truncates an arbitrary-precision value to 256 bits.
pub fn wrap(value: BigUint) -> Word {
    value & &*MASK
}

fn is_negative(value: &Word) -> bool {
    value >= &*SIGN_BIT
}

/// Two's-complement magnitude: `(sign, |value|)`.
fn signed_magnitude(value: &Word) -> (bool, BigUint) {
    if is_negative(value) { (true, &*MODULUS - value) } else { (false, value.clone()) }
}

fn from_signed_magnitude(negative: bool, magnitude: BigUint) -> Word {
    let magnitude = wrap(magnitude);
    if negative && !magnitude.is_zero() { &*MODULUS - magnitude } else { magnitude }
}

fn bool_word(value: bool) -> Word {
    if value { BigUint::one() } else { BigUint::zero() }
}

pub fn add(a: &Word, b: &Word) -> Word {
    wrap(a + b)
}

pub fn sub(a: &Word, b: &Word) -> Word {
    if a >= b { a - b } else { &*MODULUS - (b - a) }
}

pub fn mul(a: &Word, b: &Word) -> Word {
    wrap(a * b)
}

pub fn div(a: &Word, b: &Word) -> Word {
    if b.is_zero() { BigUint::zero() } else { a / b }
}

pub fn sdiv(a: &Word, b: &Word) -> Word {
    if b.is_zero() {
        return BigUint::zero();
    }
    let (sa, ma) = signed_magnitude(a);
    let (sb, mb) = signed_magnitude(b);
    // quotient truncates toward zero
    from_signed_magnitude(sa != sb, ma / mb)
}

pub fn rem(a: &Word, b: &Word) -> Word {
    if b.is_zero() { BigUint::zero() } else { a % b }
}

pub fn srem(a: &Word, b: &Word) -> Word {
    if b.is_zero() {
        return BigUint::zero();
    }
    let (sa, ma) = signed_magnitude(a);
    let (_, mb) = signed_magnitude(b);
    // remainder takes the sign of the dividend
    from_signed_magnitude(sa, ma % mb)
}

pub fn exp(base: &Word, exponent: &Word) -> Word {
    base.modpow(exponent, &MODULUS)
}

pub fn addmod(a: &Word, b: &Word, modulus: &Word) -> Word {
    if modulus.is_zero() { BigUint::zero() } else { (a + b) % modulus }
}

pub fn mulmod(a: &Word, b: &Word, modulus: &Word) -> Word {
    if modulus.is_zero() { BigUint::zero() } else { (a * b) % modulus }
}

pub fn not(value: &Word) -> Word {
    &*MASK ^ value
}

pub fn shl(shift: &Word, value: &Word) -> Word {
    match to_u32(shift) {
        Some(bits) if bits < WORD_BITS => wrap(value << bits),
        _ => BigUint::zero(),
    }
}

pub fn shr(shift: &Word, value: &Word) -> Word {
    match to_u32(shift) {
        Some(bits) if bits < WORD_BITS => value >> bits,
        _ => BigUint::zero(),
    }
}

pub fn sar(shift: &Word, value: &Word) -> Word {
    let negative = is_negative(value);
    match to_u32(shift) {
        Some(bits) if bits < WORD_BITS => {
            if negative {
                // arithmetic shift: complement, shift logically, complement back
                not(&(not(value) >> bits))
            } else {
                value >> bits
            }
        }
        _ => {
            if negative {
                MASK.clone()
            } else {
                BigUint::zero()
            }
        }
    }
}

pub fn signextend(byte_index: &Word, value: &Word) -> Word {
    let Some(index) = to_u32(byte_index) else { return value.clone() };
    if index >= 31 {
        return value.clone();
    }
    let bit = 8 * index + 7;
    let low_mask = (BigUint::one() << (bit + 1)) - 1u32;
    let sign_set = !((value >> bit) & BigUint::one()).is_zero();
    if sign_set { value | (&*MASK ^ &low_mask) } else { value & low_mask }
}

pub fn lt(a: &Word, b: &Word) -> Word {
    bool_word(a < b)
}

pub fn gt(a: &Word, b: &Word) -> Word {
    bool_word(a > b)
}

pub fn slt(a: &Word, b: &Word) -> Word {
    let (sa, sb) = (is_negative(a), is_negative(b));
    // same sign: two's-complement order coincides with unsigned order
    bool_word(if sa == sb { a < b } else { sa })
}

pub fn sgt(a: &Word, b: &Word) -> Word {
    let (sa, sb) = (is_negative(a), is_negative(b));
    bool_word(if sa == sb { a > b } else { sb })
}

pub fn eq(a: &Word, b: &Word) -> Word {
    bool_word(a == b)
}

pub fn iszero(a: &Word) -> Word {
    bool_word(a.is_zero())
}

/// Converts to `u32` when the value fits, `None` otherwise.
pub fn to_u32(value: &Word) -> Option<u32> {
    u32::try_from(value).ok()
}

/// Converts to `u64` when the value fits, `None` otherwise.
pub fn to_u64(value: &Word) -> Option<u64> {
    u64::try_from(value).ok()
}
