//! Redirecting a hook's return into arbitrary guest code.
//!
//! A hook that wants a stretch of guest code `[start, end)` to run before the hooked call
//! returns overwrites the return address on top of the stack with `start`. Once execution
//! reaches `end`, [`Detour::restore`] puts the stack and program counter back where the
//! original return would have left them.

use log::debug;

use crate::{
    emulation::{engine::CpuEngine, memory::GuestMemory},
    Result,
};

/// A pending detour, created by [`Detour::begin`].
///
/// The embedder installs a one-shot address hook at [`end`](Self::end) that calls
/// [`restore`](Self::restore).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Detour {
    start: u64,
    end: u64,
    saved_sp: u64,
    return_address: u64,
}

impl Detour {
    /// Redirects the pending return of the current hook to `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack top cannot be read or written.
    pub fn begin<M>(machine: &mut M, start: u64, end: u64) -> Result<Self>
    where
        M: GuestMemory + CpuEngine + ?Sized,
    {
        let saved_sp = machine.stack_pointer()?;
        let return_address = machine.read_pointer(saved_sp)?;
        machine.write_pointer(saved_sp, start)?;

        debug!(
            "detour 0x{start:X}..0x{end:X}, original return to 0x{return_address:X}"
        );

        Ok(Detour {
            start,
            end,
            saved_sp,
            return_address,
        })
    }

    /// First address of the detoured code.
    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Address at which execution is handed back through [`restore`](Self::restore).
    #[must_use]
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Return address the hooked call would have used.
    #[must_use]
    pub fn return_address(&self) -> u64 {
        self.return_address
    }

    /// Completes the detour: pops the hooked call's return address and resumes there.
    ///
    /// # Errors
    ///
    /// Returns an error if the registers cannot be written.
    pub fn restore<M>(&self, machine: &mut M) -> Result<()>
    where
        M: GuestMemory + CpuEngine + ?Sized,
    {
        debug!("executed code from 0x{:X} to 0x{:X}", self.start, self.end);

        let pointer_size = machine.bitness().pointer_size() as u64;
        machine.set_stack_pointer(self.saved_sp + pointer_size)?;
        machine.set_program_counter(self.return_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emulation::{Bitness, GuestHeap},
        test::ScriptedMachine,
    };

    #[test]
    fn detour_redirects_and_restores() {
        let mut machine = ScriptedMachine::new(Bitness::Bit64);
        let stack = machine.alloc(0x100).unwrap();
        let sp = stack + 0x80;
        machine.write_pointer(sp, 0x1400_0123).unwrap();
        machine.set_stack_pointer(sp).unwrap();

        let detour = Detour::begin(&mut machine, 0x1400_2000, 0x1400_2040).unwrap();
        assert_eq!(detour.return_address(), 0x1400_0123);
        assert_eq!(machine.read_pointer(sp).unwrap(), 0x1400_2000);

        detour.restore(&mut machine).unwrap();
        assert_eq!(machine.stack_pointer().unwrap(), sp + 8);
        assert_eq!(machine.program_counter().unwrap(), 0x1400_0123);
    }

    #[test]
    fn detour_on_unmapped_stack_fails() {
        let mut machine = ScriptedMachine::new(Bitness::Bit32);
        machine.set_stack_pointer(0x10).unwrap();

        assert!(Detour::begin(&mut machine, 0x1000, 0x1010).is_err());
    }
}
