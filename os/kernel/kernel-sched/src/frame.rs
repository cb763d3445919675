//! # Interrupt frames
//!
//! The clock interrupt stub pushes the general purpose registers on top of
//! what the CPU pushed and hands the scheduler a pointer to the result. A
//! thread is resumed by popping the same layout and executing `iret`, so a
//! new thread starts from a hand-built frame that looks as if it had just
//! been interrupted.
//!
//! With `#[repr(C)]`, memory from the frame pointer upwards looks like:
//!
//! ```text
//!   +0x00 edi      +0x14 edx        +0x28 eip
//!   +0x04 esi      +0x18 ecx        +0x2C cs
//!   +0x08 ebp      +0x1C eax        +0x30 eflags
//!   +0x0C esp      +0x20 interrupt  +0x34 task esp  (ring change only)
//!   +0x10 ebx      +0x24 error code +0x38 task ss   (ring change only)
//! ```

use core::mem::offset_of;
use kernel_registers::Eflags;

/// Frame of an interrupt taken without a privilege change.
#[derive(Copy, Clone, Debug, Default)]
#[repr(C)]
pub struct InterruptFrame {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub interrupt: u32,
    pub error_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: Eflags,
}

/// Frame of an interrupt taken from ring 3: the CPU also pushed the
/// interrupted stack.
#[derive(Copy, Clone, Debug, Default)]
#[repr(C)]
pub struct TaskFrame {
    pub frame: InterruptFrame,
    pub task_esp: u32,
    pub task_ss: u32,
}

impl InterruptFrame {
    pub const SIZE: u64 = size_of::<Self>() as u64;
    pub const WORDS: usize = size_of::<Self>() / 4;
    pub const EFLAGS_OFFSET: u64 = offset_of!(Self, eflags) as u64;

    /// The frame as it lies in memory, lowest address first.
    #[must_use]
    pub const fn to_words(&self) -> [u32; Self::WORDS] {
        [
            self.edi,
            self.esi,
            self.ebp,
            self.esp,
            self.ebx,
            self.edx,
            self.ecx,
            self.eax,
            self.interrupt,
            self.error_code,
            self.eip,
            self.cs,
            self.eflags.into_bits(),
        ]
    }

    #[must_use]
    pub const fn from_words(w: &[u32; Self::WORDS]) -> Self {
        Self {
            edi: w[0],
            esi: w[1],
            ebp: w[2],
            esp: w[3],
            ebx: w[4],
            edx: w[5],
            ecx: w[6],
            eax: w[7],
            interrupt: w[8],
            error_code: w[9],
            eip: w[10],
            cs: w[11],
            eflags: Eflags::from_bits(w[12]),
        }
    }
}

impl TaskFrame {
    pub const SIZE: u64 = size_of::<Self>() as u64;
    pub const WORDS: usize = size_of::<Self>() / 4;

    #[must_use]
    pub fn to_words(&self) -> [u32; Self::WORDS] {
        let mut out = [0; Self::WORDS];
        out[..InterruptFrame::WORDS].copy_from_slice(&self.frame.to_words());
        out[InterruptFrame::WORDS] = self.task_esp;
        out[InterruptFrame::WORDS + 1] = self.task_ss;
        out
    }

    #[must_use]
    pub fn from_words(w: &[u32; Self::WORDS]) -> Self {
        let mut frame = [0; InterruptFrame::WORDS];
        frame.copy_from_slice(&w[..InterruptFrame::WORDS]);
        Self {
            frame: InterruptFrame::from_words(&frame),
            task_esp: w[InterruptFrame::WORDS],
            task_ss: w[InterruptFrame::WORDS + 1],
        }
    }
}

const _: () = {
    assert!(InterruptFrame::SIZE == 52);
    assert!(TaskFrame::SIZE == 60);
    assert!(InterruptFrame::EFLAGS_OFFSET == 0x30);
    assert!(offset_of!(TaskFrame, task_esp) == 0x34);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eflags_is_the_last_word_of_the_short_frame() {
        let frame = InterruptFrame {
            eip: 0x1234,
            eflags: Eflags::new().with_if_interrupt_enable(true),
            ..InterruptFrame::default()
        };
        let words = frame.to_words();
        assert_eq!(words[10], 0x1234);
        assert_eq!(words[12], 0x202);
    }

    #[test]
    fn task_frame_appends_the_interrupted_stack() {
        let task = TaskFrame {
            frame: InterruptFrame {
                cs: 0x1B,
                ..InterruptFrame::default()
            },
            task_esp: 0xBEEF_0000,
            task_ss: 0x23,
        };
        let words = task.to_words();
        assert_eq!(words[11], 0x1B);
        assert_eq!(&words[13..], &[0xBEEF_0000, 0x23]);
        assert_eq!(TaskFrame::from_words(&words).task_esp, 0xBEEF_0000);
    }
}
