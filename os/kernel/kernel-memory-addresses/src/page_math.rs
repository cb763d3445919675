use crate::PAGE_SIZE;

/// Integer division rounding up.
///
/// ```
/// # use kernel_memory_addresses::div_ceil;
/// assert_eq!(div_ceil(4097, 4096), 2);
/// assert_eq!(div_ceil(0, 4096), 0);
/// ```
#[inline]
#[must_use]
pub const fn div_ceil(value: u64, divisor: u64) -> u64 {
    value.div_ceil(divisor)
}

/// Number of 4 KiB pages needed to hold `bytes`.
#[inline]
#[must_use]
pub const fn pages_for(bytes: u64) -> u64 {
    div_ceil(bytes, PAGE_SIZE)
}

/// Smallest power of two `>= value`, with `0` rounded up to `1`.
///
/// ```
/// # use kernel_memory_addresses::ceil_to_power_of_two;
/// assert_eq!(ceil_to_power_of_two(0), 1);
/// assert_eq!(ceil_to_power_of_two(3), 4);
/// assert_eq!(ceil_to_power_of_two(256), 256);
/// ```
#[inline]
#[must_use]
pub const fn ceil_to_power_of_two(value: u64) -> u64 {
    if value <= 1 {
        return 1;
    }
    value.next_power_of_two()
}

/// Largest power of two `<= value`, `0` for `0`.
#[inline]
#[must_use]
pub const fn floor_to_power_of_two(value: u64) -> u64 {
    if value == 0 {
        return 0;
    }
    1_u64 << (63 - value.leading_zeros())
}

/// log2 of a power of two.
#[inline]
#[must_use]
pub const fn log2_of_power_of_two(value: u64) -> u32 {
    debug_assert!(value.is_power_of_two());
    value.trailing_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floors() {
        assert_eq!(floor_to_power_of_two(0), 0);
        assert_eq!(floor_to_power_of_two(1), 1);
        assert_eq!(floor_to_power_of_two(4095), 2048);
        assert_eq!(floor_to_power_of_two(32 * 1024 * 1024), 32 * 1024 * 1024);
    }

    #[test]
    fn logs() {
        assert_eq!(log2_of_power_of_two(1), 0);
        assert_eq!(log2_of_power_of_two(256), 8);
        assert_eq!(log2_of_power_of_two(ceil_to_power_of_two(5)), 3);
    }

    #[test]
    fn page_counts() {
        assert_eq!(pages_for(0), 0);
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(0x4000), 4);
        assert_eq!(pages_for(0x4001), 5);
    }
}
