//! Collaborator interfaces to the CPU emulator.
//!
//! The instruction-level emulator is external to this crate. The emulation core drives it
//! through two traits:
//!
//! - [`CpuEngine`] - run guest code from an entry point until it returns, and access the
//!   program counter and stack pointer
//! - [`CallingConvention`] - place call parameters where the guest callee expects them
//!
//! Together with [`GuestMemory`] and [`GuestHeap`] they form a [`GuestMachine`], which is
//! what the I/O request emulator borrows for the duration of one request.
//!
//! The module also hosts the fault model ([`CpuFault`], [`FaultClassifier`]), the
//! domain error type [`EmulationError`] and the return-address [`Detour`].

mod detour;
mod error;
mod fault;

pub use detour::Detour;
pub use error::EmulationError;
pub use fault::{
    CpuFault, FaultClassifier, FaultKind, FaultVerdict, ReturnSiteClassifier, StrictClassifier,
};

use strum::{Display, EnumIter};

use crate::{
    emulation::memory::{GuestHeap, GuestMemory},
    Result,
};

/// The instruction-level CPU emulator.
pub trait CpuEngine {
    /// Executes guest code starting at `entry` until the routine returns.
    ///
    /// # Errors
    ///
    /// Returns the [`CpuFault`] that stopped execution, if any.
    fn run_until_return(&mut self, entry: u64) -> std::result::Result<(), CpuFault>;

    /// Reads the program counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the register cannot be read.
    fn program_counter(&self) -> Result<u64>;

    /// Writes the program counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the register cannot be written.
    fn set_program_counter(&mut self, value: u64) -> Result<()>;

    /// Reads the stack pointer.
    ///
    /// # Errors
    ///
    /// Returns an error if the register cannot be read.
    fn stack_pointer(&self) -> Result<u64>;

    /// Writes the stack pointer.
    ///
    /// # Errors
    ///
    /// Returns an error if the register cannot be written.
    fn set_stack_pointer(&mut self, value: u64) -> Result<()>;
}

/// Kind of a call parameter, as understood by the calling-convention writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ParamKind {
    /// Guest pointer.
    #[strum(to_string = "POINTER")]
    Pointer,
    /// 32-bit integer.
    #[strum(to_string = "DWORD")]
    Dword,
    /// 64-bit integer.
    #[strum(to_string = "QWORD")]
    Qword,
}

/// Writes call parameters for a guest callee.
///
/// Driver dispatch routines are invoked with two pointer parameters (device object, IRP)
/// using the platform's kernel calling convention.
pub trait CallingConvention {
    /// Places `params` where the callee expects them, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns an error if registers or stack cannot be written.
    fn write_params(&mut self, params: &[(ParamKind, u64)]) -> Result<()>;
}

/// Everything the I/O request emulator needs from its host.
///
/// Blanket-implemented for any type providing all four collaborator traits.
pub trait GuestMachine: GuestMemory + GuestHeap + CpuEngine + CallingConvention {}

impl<T> GuestMachine for T where T: GuestMemory + GuestHeap + CpuEngine + CallingConvention {}
