//! # Segment selectors for 32-bit protected mode
//!
//! A thread frame carries the code selector the CPU loads on `iret`, and the
//! switch path loads a data selector into DS/ES/FS/GS. A selector encodes:
//!
//! ```text
//!  15            3 2  1  0
//! +----------------+--+----+
//! |   Index[12:0]  |TI| RPL|
//! +----------------+--+----+  (TI=0 → GDT, TI=1 → LDT; RPL=0..3)
//! ```
//!
//! The typed wrappers keep a data selector out of CS and vice versa.

use bitfield_struct::bitfield;
use core::fmt;
use core::marker::PhantomData;

/// Requested privilege level, the low two selector bits.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum Rpl {
    Ring0 = 0,
    Ring1 = 1,
    Ring2 = 2,
    Ring3 = 3,
}

impl Rpl {
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Ring0,
            1 => Self::Ring1,
            2 => Self::Ring2,
            _ => Self::Ring3,
        }
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }
}

/// Which descriptor table a selector addresses.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum Table {
    Gdt = 0,
    Ldt = 1,
}

impl Table {
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        if bits == 0 { Self::Gdt } else { Self::Ldt }
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }
}

/// Raw 16-bit selector encoding.
#[bitfield(u16)]
#[derive(Eq, PartialEq)]
pub struct SegmentSelectorRaw {
    #[bits(2)]
    rpl: Rpl,
    #[bits(1)]
    ti: Table,
    #[bits(13)]
    index: u16,
}

impl SegmentSelectorRaw {
    #[inline]
    #[must_use]
    pub const fn new_with(index: u16, table: Table, rpl: Rpl) -> Self {
        Self::new().with_index(index).with_ti(table).with_rpl(rpl)
    }
}

pub trait SelectorKind: Copy {}

/// Code segment (CS) selector.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CodeSel {}

/// Data/stack (DS/ES/SS) selector.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DataSel {}

impl SelectorKind for CodeSel {}
impl SelectorKind for DataSel {}

#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct SegmentSelector<K: SelectorKind>(SegmentSelectorRaw, PhantomData<K>);

impl<K: SelectorKind> SegmentSelector<K> {
    /// A GDT selector with the given index and RPL.
    #[inline]
    #[must_use]
    pub const fn new(index: u16, rpl: Rpl) -> Self {
        Self(SegmentSelectorRaw::new_with(index, Table::Gdt, rpl), PhantomData)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> SegmentSelectorRaw {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn rpl(self) -> Rpl {
        self.0.rpl()
    }

    /// Encoding as written into a frame or loaded into a segment register.
    #[inline]
    #[must_use]
    pub const fn encode(self) -> u16 {
        self.0.into_bits()
    }
}

impl<K: SelectorKind> fmt::Debug for SegmentSelector<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector(0x{:02X})", self.encode())
    }
}

pub const KERNEL_CODE: SegmentSelector<CodeSel> = SegmentSelector::new(1, Rpl::Ring0);
pub const KERNEL_DATA: SegmentSelector<DataSel> = SegmentSelector::new(2, Rpl::Ring0);
pub const USER_CODE: SegmentSelector<CodeSel> = SegmentSelector::new(3, Rpl::Ring3);
pub const USER_DATA: SegmentSelector<DataSel> = SegmentSelector::new(4, Rpl::Ring3);
