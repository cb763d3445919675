use crate::{KernelMemoryMap, MemoryMapError};

/// Append-only, fixed-capacity list of map entries.
#[derive(Clone)]
pub struct KernelMemoryMapArray<const N: usize> {
    items: [KernelMemoryMap; N],
    count: usize,
}

impl<const N: usize> Default for KernelMemoryMapArray<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> KernelMemoryMapArray<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: [KernelMemoryMap::EMPTY; N],
            count: 0,
        }
    }

    /// # Errors
    /// [`MemoryMapError::Full`] once `N` entries were added.
    pub const fn add(&mut self, map: KernelMemoryMap) -> Result<(), MemoryMapError> {
        if self.count >= N {
            return Err(MemoryMapError::Full { capacity: N });
        }
        self.items[self.count] = map;
        self.count += 1;
        Ok(())
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[must_use]
    pub fn as_slice(&self) -> &[KernelMemoryMap] {
        &self.items[..self.count]
    }

    pub fn iter(&self) -> impl Iterator<Item = &KernelMemoryMap> {
        self.as_slice().iter()
    }

    #[must_use]
    pub fn contains_addr(&self, addr: u64) -> bool {
        self.iter().any(|m| m.contains_addr(addr))
    }

    /// Whether a single entry fully contains `map`.
    #[must_use]
    pub fn contains(&self, map: &KernelMemoryMap) -> bool {
        self.iter().any(|m| m.contains_map(map))
    }

    #[must_use]
    pub fn intersects(&self, map: &KernelMemoryMap) -> bool {
        self.iter().any(|m| m.intersects(map))
    }
}
