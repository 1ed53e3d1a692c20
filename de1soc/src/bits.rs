//! Bit manipulation helpers shared by the drivers.
//!
//! Registers are 32-bit wide. Fields are described by their shift (position
//! of the least significant bit) and width in bits.

/// Returns a value with only bit `n` set.
#[inline(always)]
pub const fn bit(n: u32) -> u32 {
    1 << n
}

/// Returns a mask with the `width` least significant bits set.
#[inline(always)]
pub const fn mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

/// Extracts the field at `shift` with `width` bits from `reg`.
#[inline(always)]
pub const fn field(reg: u32, shift: u32, width: u32) -> u32 {
    (reg >> shift) & mask(width)
}

/// Returns `reg` with the field at `shift` with `width` bits replaced by
/// `value`. Bits of `value` that do not fit in the field are discarded.
#[inline(always)]
pub const fn insert(reg: u32, value: u32, shift: u32, width: u32) -> u32 {
    let m = mask(width) << shift;
    (reg & !m) | ((value << shift) & m)
}

/// Returns `reg` with the bits in `mask` set.
#[inline(always)]
pub const fn set(reg: u32, mask: u32) -> u32 {
    reg | mask
}

/// Returns `reg` with the bits in `mask` cleared.
#[inline(always)]
pub const fn clear(reg: u32, mask: u32) -> u32 {
    reg & !mask
}

/// Returns `reg` with the bits in `mask` taken from `value`.
#[inline(always)]
pub const fn modify(reg: u32, value: u32, mask: u32) -> u32 {
    (reg & !mask) | (value & mask)
}

/// Returns true if any of the bits in `mask` is set in `reg`.
#[inline(always)]
pub const fn check(reg: u32, mask: u32) -> bool {
    reg & mask != 0
}
