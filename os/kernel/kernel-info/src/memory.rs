//! # Memory Layout

use kernel_memory_addresses::MemoryRegion;

const MIB: u64 = 1024 * 1024;

/// Size of one page frame.
pub const PAGE_SIZE: u64 = 4096;

/// Start of the identity-mapped window (192 MiB). Virtual addresses handed
/// out from here are numerically equal to their physical frames.
pub const IDENTITY_MAP_START: u64 = 0x0C00_0000;

/// Size of the identity-mapped pool.
pub const IDENTITY_MAP_SIZE: u64 = 60 * MIB;

/// Start of the general kernel virtual memory (1 GiB).
pub const VIRT_MAP_START: u64 = 0x4000_0000;

/// Size of the boot-time free-list stage of the normal pool.
pub const NORMAL_INITIAL_STAGE_SIZE: u64 = 32 * MIB;

/// Size of the buddy stage of the normal pool, directly after the free-list stage.
pub const NORMAL_BUDDY_STAGE_SIZE: u64 = 32 * MIB;

/// Start of the global (all address spaces) pool.
pub const GLOBAL_POOL_START: u64 = 600 * MIB;

/// Size of the global pool.
pub const GLOBAL_POOL_SIZE: u64 = 100 * MIB;

/// Number of buddy free lists; blocks range from 1 to `2^(BUDDY_MAX_ORDER-1)` pages.
pub const BUDDY_MAX_ORDER: u8 = 9;

/// Requests below this page count go to the fast sub-allocator of a multi allocator.
pub const MULTI_ALLOCATOR_THRESHOLD: u64 = 512;

/// Size of the initial kernel memory map region.
pub const KERNEL_MEMORY_MAP_SIZE: u64 = 20 * PAGE_SIZE;

/// Capacity of the `SystemUsable` kernel memory map array.
pub const SYSTEM_USABLE_MAP_CAPACITY: usize = 50;

/// Capacity of the `Used` kernel memory map array.
pub const USED_MAP_CAPACITY: usize = 100;

/// Capacity of the `KernelReserved` kernel memory map array.
pub const KERNEL_RESERVED_MAP_CAPACITY: usize = 100;

/// Pattern written over kernel-reserved frames during physical setup.
pub const RESERVED_FILL_PATTERN: u32 = 0xFFFF_FFFF;

/// Pattern written by the allocator self tests.
pub const SELF_TEST_PATTERN: u32 = 0xEBFE_EBFE;

/// Placement of the virtual page pools and the identity window.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryLayout {
    pub identity: MemoryRegion,
    pub normal_initial: MemoryRegion,
    pub normal_buddy: MemoryRegion,
    pub global: MemoryRegion,
}

impl MemoryLayout {
    pub const DEFAULT: Self = Self {
        identity: MemoryRegion::new(IDENTITY_MAP_START, IDENTITY_MAP_SIZE),
        normal_initial: MemoryRegion::new(VIRT_MAP_START, NORMAL_INITIAL_STAGE_SIZE),
        normal_buddy: MemoryRegion::new(
            VIRT_MAP_START + NORMAL_INITIAL_STAGE_SIZE,
            NORMAL_BUDDY_STAGE_SIZE,
        ),
        global: MemoryRegion::new(GLOBAL_POOL_START, GLOBAL_POOL_SIZE),
    };

    /// Where the identity window begins; physical allocation never hands out frames above.
    #[must_use]
    pub const fn identity_map_start(&self) -> u64 {
        self.identity.start().as_u64()
    }
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

const _: () = {
    assert!(IDENTITY_MAP_START.is_multiple_of(PAGE_SIZE));
    assert!(VIRT_MAP_START.is_multiple_of(PAGE_SIZE));
    assert!(GLOBAL_POOL_START.is_multiple_of(PAGE_SIZE));
    assert!(NORMAL_BUDDY_STAGE_SIZE.is_power_of_two());
    assert!(IDENTITY_MAP_START + IDENTITY_MAP_SIZE <= GLOBAL_POOL_START);
    assert!(GLOBAL_POOL_START + GLOBAL_POOL_SIZE <= VIRT_MAP_START);
    assert!((1 << (BUDDY_MAX_ORDER - 1)) < MULTI_ALLOCATOR_THRESHOLD);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_are_disjoint() {
        let l = MemoryLayout::DEFAULT;
        let pools = [l.identity, l.normal_initial, l.normal_buddy, l.global];
        for (i, a) in pools.iter().enumerate() {
            for b in pools.iter().skip(i + 1) {
                assert!(!a.intersects(b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn buddy_stage_follows_initial_stage() {
        let l = MemoryLayout::default();
        assert_eq!(l.normal_initial.end(), l.normal_buddy.start());
    }
}
