//! Alignment math shared by the memory pools and packed buffer layouts.

/// Round `value` up to the next multiple of `alignment`.
///
/// An alignment of zero leaves the value untouched; device limits report
/// zero when no alignment is required. Non-zero alignments must be powers
/// of two, as every Vulkan alignment limit is.
#[inline]
#[must_use]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        value
    } else {
        (value + alignment - 1) & !(alignment - 1)
    }
}

/// Round `value` down to the previous multiple of `alignment`.
///
/// Same alignment contract as [`align_up`]: zero is identity, non-zero
/// alignments are powers of two.
#[inline]
#[must_use]
pub const fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        value
    } else {
        value & !(alignment - 1)
    }
}

/// Whether `value` is a multiple of `alignment` (zero alignment accepts all).
#[inline]
#[must_use]
pub const fn is_aligned(value: u64, alignment: u64) -> bool {
    alignment == 0 || value & (alignment - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_next_multiple() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 64), 128);
        assert_eq!(align_up(1000, 256), 1024);
    }

    #[test]
    fn align_up_zero_alignment_is_identity() {
        assert_eq!(align_up(37, 0), 37);
    }

    #[test]
    fn align_down_rounds_to_previous_multiple() {
        assert_eq!(align_down(0, 64), 0);
        assert_eq!(align_down(63, 64), 0);
        assert_eq!(align_down(64, 64), 64);
        assert_eq!(align_down(100, 64), 64);
        assert_eq!(align_down(37, 0), 37);
    }

    #[test]
    fn is_aligned_checks_multiples() {
        assert!(is_aligned(0, 16));
        assert!(is_aligned(128, 64));
        assert!(!is_aligned(100, 64));
        assert!(is_aligned(3, 0));
    }
}
