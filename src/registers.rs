//! An architecture-tagged snapshot of a tracee's user register file. The
//! ptrace driver fills one of these in at each syscall stop; the syscall
//! handlers mutate it and hand it back to be committed to the tracee in a
//! single set_regs.

use crate::kernel_abi::{x64, x86, SupportedArch};
use crate::kernel_supplement::{
    ERESTARTNOHAND, ERESTARTNOINTR, ERESTARTSYS, ERESTART_RESTARTBLOCK,
};
use crate::remote_ptr::{RemotePtr, Void};

#[repr(C)]
#[derive(Copy, Clone)]
pub union RegistersUnion {
    x86: x86::user_regs_struct,
    x64: x64::user_regs_struct,
}

impl Default for RegistersUnion {
    fn default() -> RegistersUnion {
        RegistersUnion {
            x64: x64::user_regs_struct::default(),
        }
    }
}

// Reads are zero-extended for the unsigned accessors: x86 register values
// are 32-bit quantities and must not pick up sign bits on a 64-bit
// recorder.
macro_rules! redo_get_reg {
    ($slf:expr, $x86case:ident, $x64case:ident) => {
        unsafe {
            match $slf.arch_ {
                crate::kernel_abi::SupportedArch::X86 => $slf.u.x86.$x86case as u32 as usize,
                crate::kernel_abi::SupportedArch::X64 => $slf.u.x64.$x64case as usize,
            }
        }
    };
}

macro_rules! redo_get_reg_signed {
    ($slf:expr, $x86case:ident, $x64case:ident) => {
        unsafe {
            match $slf.arch_ {
                crate::kernel_abi::SupportedArch::X86 => $slf.u.x86.$x86case as isize,
                crate::kernel_abi::SupportedArch::X64 => $slf.u.x64.$x64case as i64 as isize,
            }
        }
    };
}

macro_rules! redo_set_reg {
    ($slf:expr, $x86case:ident, $x64case:ident, $val:expr) => {
        match $slf.arch_ {
            crate::kernel_abi::SupportedArch::X86 => unsafe {
                $slf.u.x86.$x86case = $val as i32;
            },
            crate::kernel_abi::SupportedArch::X64 => unsafe {
                $slf.u.x64.$x64case = $val as u64;
            },
        }
    };
}

#[derive(Copy, Clone)]
pub struct Registers {
    arch_: SupportedArch,
    u: RegistersUnion,
}

impl Registers {
    pub fn new(arch: SupportedArch) -> Registers {
        Registers {
            arch_: arch,
            u: RegistersUnion::default(),
        }
    }

    pub fn arch(&self) -> SupportedArch {
        self.arch_
    }

    pub fn syscallno(&self) -> isize {
        redo_get_reg_signed!(self, eax, rax)
    }

    pub fn set_syscallno(&mut self, syscallno: isize) {
        redo_set_reg!(self, eax, rax, syscallno)
    }

    pub fn original_syscallno(&self) -> isize {
        redo_get_reg_signed!(self, orig_eax, orig_rax)
    }

    pub fn syscall_result(&self) -> usize {
        redo_get_reg!(self, eax, rax)
    }

    pub fn syscall_result_signed(&self) -> isize {
        redo_get_reg_signed!(self, eax, rax)
    }

    pub fn set_syscall_result(&mut self, syscall_result: usize) {
        redo_set_reg!(self, eax, rax, syscall_result)
    }

    pub fn set_syscall_result_signed(&mut self, syscall_result: isize) {
        redo_set_reg!(self, eax, rax, syscall_result)
    }

    /// Did the syscall fail with an errno? The kernel reserves
    /// [-4096, 0) of the result space for errnos.
    pub fn syscall_failed(&self) -> bool {
        let result = self.syscall_result_signed();
        -4096 < result && result < 0
    }

    /// Did the syscall get interrupted with a restart request?
    pub fn syscall_may_restart(&self) -> bool {
        matches!(
            (-self.syscall_result_signed()) as i32,
            ERESTART_RESTARTBLOCK | ERESTARTNOINTR | ERESTARTNOHAND | ERESTARTSYS
        )
    }

    pub fn sp(&self) -> RemotePtr<Void> {
        RemotePtr::new(redo_get_reg!(self, esp, rsp))
    }

    pub fn set_sp(&mut self, sp: RemotePtr<Void>) {
        redo_set_reg!(self, esp, rsp, sp.as_usize())
    }

    pub fn arg1(&self) -> usize {
        redo_get_reg!(self, ebx, rdi)
    }
    pub fn arg1_signed(&self) -> isize {
        redo_get_reg_signed!(self, ebx, rdi)
    }
    pub fn set_arg1(&mut self, value: usize) {
        redo_set_reg!(self, ebx, rdi, value)
    }

    pub fn arg2(&self) -> usize {
        redo_get_reg!(self, ecx, rsi)
    }
    pub fn arg2_signed(&self) -> isize {
        redo_get_reg_signed!(self, ecx, rsi)
    }
    pub fn set_arg2(&mut self, value: usize) {
        redo_set_reg!(self, ecx, rsi, value)
    }

    pub fn arg3(&self) -> usize {
        redo_get_reg!(self, edx, rdx)
    }
    pub fn arg3_signed(&self) -> isize {
        redo_get_reg_signed!(self, edx, rdx)
    }
    pub fn set_arg3(&mut self, value: usize) {
        redo_set_reg!(self, edx, rdx, value)
    }

    pub fn arg4(&self) -> usize {
        redo_get_reg!(self, esi, r10)
    }
    pub fn arg4_signed(&self) -> isize {
        redo_get_reg_signed!(self, esi, r10)
    }
    pub fn set_arg4(&mut self, value: usize) {
        redo_set_reg!(self, esi, r10, value)
    }

    pub fn arg5(&self) -> usize {
        redo_get_reg!(self, edi, r8)
    }
    pub fn arg5_signed(&self) -> isize {
        redo_get_reg_signed!(self, edi, r8)
    }
    pub fn set_arg5(&mut self, value: usize) {
        redo_set_reg!(self, edi, r8, value)
    }

    pub fn arg6(&self) -> usize {
        redo_get_reg!(self, ebp, r9)
    }
    pub fn arg6_signed(&self) -> isize {
        redo_get_reg_signed!(self, ebp, r9)
    }
    pub fn set_arg6(&mut self, value: usize) {
        redo_set_reg!(self, ebp, r9, value)
    }

    pub fn arg(&self, index: i32) -> usize {
        match index {
            1 => self.arg1(),
            2 => self.arg2(),
            3 => self.arg3(),
            4 => self.arg4(),
            5 => self.arg5(),
            6 => self.arg6(),
            _ => {
                fatal!("Argument index {} out of range", index);
            }
        }
    }

    pub fn set_arg(&mut self, index: i32, value: usize) {
        match index {
            1 => self.set_arg1(value),
            2 => self.set_arg2(value),
            3 => self.set_arg3(value),
            4 => self.set_arg4(value),
            5 => self.set_arg5(value),
            6 => self.set_arg6(value),
            _ => {
                fatal!("Argument index {} out of range", index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel_abi::SupportedArch::{X64, X86};

    #[test]
    fn arg_roundtrip_x64() {
        let mut r = Registers::new(X64);
        for i in 1..=6 {
            r.set_arg(i, 0x1000 + i as usize);
        }
        for i in 1..=6 {
            assert_eq!(0x1000 + i as usize, r.arg(i));
        }
    }

    #[test]
    fn x86_values_are_zero_extended() {
        let mut r = Registers::new(X86);
        r.set_arg1(0xfffff000);
        assert_eq!(0xfffff000, r.arg1());
        assert_eq!(-0x1000, r.arg1_signed());
    }

    #[test]
    fn syscall_result_signedness() {
        let mut r = Registers::new(X64);
        r.set_syscall_result_signed(-(libc::EINVAL as isize));
        assert!(r.syscall_failed());
        assert_eq!(-(libc::EINVAL as isize), r.syscall_result_signed());

        r.set_syscall_result(10);
        assert!(!r.syscall_failed());

        r.set_syscall_result_signed(-(super::ERESTARTSYS as isize));
        assert!(r.syscall_may_restart());
    }

    #[test]
    fn sp_tracks_arch_register() {
        let mut r = Registers::new(X64);
        r.set_sp(RemotePtr::new(0x7fff0000));
        assert_eq!(0x7fff0000, r.sp().as_usize());
    }
}
