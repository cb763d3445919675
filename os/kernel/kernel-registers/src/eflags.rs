use bitfield_struct::bitfield;

/// Architectural EFLAGS model for 32-bit protected mode.
///
/// This is the value the processor pops from an interrupt frame on `iret`,
/// so it is also what a freshly built thread frame carries.
///
/// Bit 1 is architecturally fixed to one and modeled with `default = true`,
/// so `Eflags::new()` is already a valid initial value.
#[bitfield(u32, order = Lsb)]
pub struct Eflags {
    /// Carry Flag
    pub cf_carry: bool, // 0

    /// Always 1.
    #[bits(default = true)]
    _always1: bool, // 1

    /// Parity Flag
    pub pf_parity: bool, // 2

    #[bits(default = false)]
    _rsvd3: bool, // 3

    /// Adjust Flag
    pub af_adjust: bool, // 4

    #[bits(default = false)]
    _rsvd5: bool, // 5

    /// Zero Flag
    pub zf_zero: bool, // 6

    /// Sign Flag
    pub sf_sign: bool, // 7

    /// Trap Flag
    pub tf_trap: bool, // 8

    /// Interrupt Enable Flag
    pub if_interrupt_enable: bool, // 9

    /// Direction Flag
    pub df_direction: bool, // 10

    /// Overflow Flag
    pub of_overflow: bool, // 11

    /// I/O Privilege Level (2 bits). Level 3 allows ring-3 port I/O.
    #[bits(2)]
    pub iopl: u8, // 12–13

    /// Nested Task
    pub nt_nested: bool, // 14

    #[bits(default = false)]
    _rsvd15: bool, // 15

    /// Resume Flag
    pub rf_resume: bool, // 16

    /// Virtual 8086 mode
    pub vm_virtual_8086: bool, // 17

    /// Alignment Check
    pub ac_alignment_check: bool, // 18

    /// Virtual Interrupt Flag
    pub vif_virtual_interrupt: bool, // 19

    /// Virtual Interrupt Pending
    pub vip_virtual_interrupt_pending: bool, // 20

    /// ID Flag: allows toggling CPUID.
    pub id_cpuid: bool, // 21

    #[bits(10, default = 0)]
    _reserved_rest: u16,
}

impl Eflags {
    /// I/O privilege level that grants user mode access to I/O ports.
    pub const USER_IOPL: u8 = 3;

    /// The reserved-bit-only value a new thread starts with.
    pub const RESERVED: u32 = 1 << 1;

    /// Interrupt enable bit mask.
    pub const INTERRUPT_ENABLE: u32 = 1 << 9;
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl crate::LoadRegister for Eflags {
    fn load() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            let flags: u64;
            unsafe {
                core::arch::asm!("pushfq", "pop {}", out(reg) flags, options(preserves_flags));
            }
            #[allow(clippy::cast_possible_truncation)]
            Self::from_bits(flags as u32)
        }
        #[cfg(target_arch = "x86")]
        {
            let flags: u32;
            unsafe {
                core::arch::asm!("pushfd", "pop {}", out(reg) flags, options(preserves_flags));
            }
            Self::from_bits(flags)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_has_reserved_bit() {
        assert_eq!(Eflags::new().into_bits(), Eflags::RESERVED);
    }

    #[test]
    fn interrupt_enable_is_bit_9() {
        let f = Eflags::new().with_if_interrupt_enable(true);
        assert_eq!(f.into_bits(), Eflags::RESERVED | Eflags::INTERRUPT_ENABLE);
    }

    #[test]
    fn user_iopl_sets_bits_12_13() {
        let f = Eflags::new().with_iopl(Eflags::USER_IOPL);
        assert_eq!(f.into_bits(), Eflags::RESERVED | (3 << 12));
        assert_eq!(Eflags::from_bits(0x3202).iopl(), 3);
    }
}
