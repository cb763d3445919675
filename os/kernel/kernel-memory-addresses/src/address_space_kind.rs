use core::fmt;

/// The address spaces a region or allocator is valid in.
#[repr(u8)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum AddressSpaceKind {
    #[default]
    None = 0,
    Physical = 1,
    Virtual = 2,
    /// Identity mapped: the address is valid in both spaces.
    Both = 3,
}

impl AddressSpaceKind {
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn includes_physical(self) -> bool {
        self.bits() & Self::Physical.bits() != 0
    }

    #[inline]
    #[must_use]
    pub const fn includes_virtual(self) -> bool {
        self.bits() & Self::Virtual.bits() != 0
    }
}

impl fmt::Debug for AddressSpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "None",
            Self::Physical => "Physical",
            Self::Virtual => "Virtual",
            Self::Both => "Both",
        })
    }
}

impl fmt::Display for AddressSpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_includes_each() {
        assert!(AddressSpaceKind::Both.includes_physical());
        assert!(AddressSpaceKind::Both.includes_virtual());
        assert!(!AddressSpaceKind::Virtual.includes_physical());
        assert!(!AddressSpaceKind::None.includes_virtual());
    }
}
