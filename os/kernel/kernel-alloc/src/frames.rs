//! Page array shared by all allocators, plus circular list helpers over it.

use crate::page::{NONE, Page, PageNumber};
use crate::SetupError;
use kernel_memory_addresses::{MemoryAddress, MemoryRegion, PAGE_SIZE};

/// The page records of one allocator and the region they describe.
pub(crate) struct PageFrames<'a> {
    pages: &'a mut [Page],
    region: MemoryRegion,
    first: u64,
}

impl<'a> PageFrames<'a> {
    /// Takes the first `region.pages()` records of `storage` and resets them.
    pub(crate) fn new(region: MemoryRegion, storage: &'a mut [Page]) -> Result<Self, SetupError> {
        if region.is_empty() {
            return Err(SetupError::EmptyRegion);
        }
        if !region.is_page_aligned() {
            return Err(SetupError::Unaligned(region));
        }
        let needed = region.pages();
        let provided = storage.len() as u64;
        if provided < needed {
            return Err(SetupError::StorageTooSmall { needed, provided });
        }

        let (pages, _) = storage.split_at_mut(usize::try_from(needed).map_err(|_| {
            SetupError::StorageTooSmall { needed, provided }
        })?);
        let first = region.start().as_u64() / PAGE_SIZE;
        for (i, page) in pages.iter_mut().enumerate() {
            *page = Page::new(region.start().as_u64() + i as u64 * PAGE_SIZE);
        }
        Ok(Self {
            pages,
            region,
            first,
        })
    }

    #[inline]
    pub(crate) const fn region(&self) -> MemoryRegion {
        self.region
    }

    #[inline]
    pub(crate) const fn len(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let len = self.pages.len() as u32;
        len
    }

    #[inline]
    pub(crate) fn index_of(&self, num: PageNumber) -> Option<u32> {
        let idx = num.as_u64().checked_sub(self.first)?;
        (idx < u64::from(self.len())).then(|| {
            #[allow(clippy::cast_possible_truncation)]
            let idx = idx as u32;
            idx
        })
    }

    #[inline]
    pub(crate) fn index_of_address(&self, addr: MemoryAddress) -> Option<u32> {
        self.index_of(PageNumber::containing(addr))
    }

    #[inline]
    pub(crate) const fn number_of(&self, idx: u32) -> PageNumber {
        PageNumber::new(self.first + idx as u64)
    }

    #[inline]
    pub(crate) fn get(&self, idx: u32) -> &Page {
        &self.pages[idx as usize]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, idx: u32) -> &mut Page {
        &mut self.pages[idx as usize]
    }

    #[inline]
    pub(crate) fn page(&self, num: PageNumber) -> Option<&Page> {
        self.index_of(num).map(|i| self.get(i))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Page> {
        self.pages.iter_mut()
    }

    pub(crate) fn count_free(&self) -> u64 {
        self.pages.iter().filter(|p| p.is_free()).count() as u64
    }

    /// Appends `idx` at the tail of the circular list starting at `*head`.
    pub(crate) fn push_back(&mut self, head: &mut u32, idx: u32) {
        if *head == NONE {
            let p = self.get_mut(idx);
            p.next = idx;
            p.prev = idx;
            *head = idx;
            return;
        }
        let first = *head;
        let last = self.get(first).prev;
        self.get_mut(idx).next = first;
        self.get_mut(idx).prev = last;
        self.get_mut(last).next = idx;
        self.get_mut(first).prev = idx;
    }

    /// Inserts `idx` as the new head of the circular list.
    pub(crate) fn push_front(&mut self, head: &mut u32, idx: u32) {
        self.push_back(head, idx);
        *head = idx;
    }

    /// Unlinks `idx`, leaving it a single-element ring.
    pub(crate) fn unlink(&mut self, head: &mut u32, idx: u32) {
        let Page { next, prev, .. } = *self.get(idx);
        if next == idx {
            *head = NONE;
        } else {
            self.get_mut(prev).next = next;
            self.get_mut(next).prev = prev;
            if *head == idx {
                *head = next;
            }
        }
        let p = self.get_mut(idx);
        p.next = idx;
        p.prev = idx;
    }

    /// Number of records on the circular list starting at `head`.
    pub(crate) fn list_len(&self, head: u32) -> u64 {
        if head == NONE {
            return 0;
        }
        let mut n = 1;
        let mut cur = self.get(head).next;
        while cur != head {
            n += 1;
            cur = self.get(cur).next;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(storage: &mut [Page]) -> PageFrames<'_> {
        PageFrames::new(MemoryRegion::new(0x10_0000, 8 * PAGE_SIZE), storage).unwrap()
    }

    #[test]
    fn numbering() {
        let mut storage = [Page::EMPTY; 10];
        let f = frames(&mut storage);
        assert_eq!(f.len(), 8);
        assert_eq!(f.index_of(PageNumber::new(0x100)), Some(0));
        assert_eq!(f.index_of(PageNumber::new(0x108)), None);
        assert_eq!(f.index_of(PageNumber::new(0xFF)), None);
        assert_eq!(f.number_of(3), PageNumber::new(0x103));
        assert_eq!(f.get(3).address().as_u64(), 0x10_3000);
    }

    #[test]
    fn rejects_bad_regions() {
        let mut storage = [Page::EMPTY; 4];
        assert!(matches!(
            PageFrames::new(MemoryRegion::new(0, 8 * PAGE_SIZE), &mut storage),
            Err(SetupError::StorageTooSmall { needed: 8, provided: 4 })
        ));
        assert!(matches!(
            PageFrames::new(MemoryRegion::new(0x10, PAGE_SIZE), &mut storage),
            Err(SetupError::Unaligned(_))
        ));
        assert!(matches!(
            PageFrames::new(MemoryRegion::empty(), &mut storage),
            Err(SetupError::EmptyRegion)
        ));
    }

    #[test]
    fn circular_list_ops() {
        let mut storage = [Page::EMPTY; 8];
        let mut f = frames(&mut storage);
        let mut head = NONE;
        for i in [2, 4, 6] {
            f.push_back(&mut head, i);
        }
        f.push_front(&mut head, 1);
        assert_eq!(head, 1);
        assert_eq!(f.list_len(head), 4);
        assert_eq!(f.get(1).next, 2);
        assert_eq!(f.get(1).prev, 6);

        f.unlink(&mut head, 1);
        assert_eq!(head, 2);
        assert_eq!(f.get(1).next, 1);
        f.unlink(&mut head, 4);
        assert_eq!(f.get(2).next, 6);
        f.unlink(&mut head, 2);
        f.unlink(&mut head, 6);
        assert_eq!(head, NONE);
        assert_eq!(f.list_len(head), 0);
    }
}
