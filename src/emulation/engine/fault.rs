//! CPU faults raised while guest code runs, and their classification.
//!
//! The CPU emulator reports an abnormal stop of guest execution as a [`CpuFault`]. Not every
//! fault means the guest misbehaved: a dispatch routine that returns into an unmapped
//! sentinel address stops the emulator with a fetch fault, which is exactly how a bare
//! "run this function" call ends. A [`FaultClassifier`] decides which faults are benign and
//! which abort the request.

use std::fmt;

use strum::{Display, EnumIter};

/// The reason the CPU emulator stopped executing guest code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum FaultKind {
    /// Read from unmapped memory.
    #[strum(to_string = "read from unmapped memory")]
    ReadUnmapped,
    /// Write to unmapped memory.
    #[strum(to_string = "write to unmapped memory")]
    WriteUnmapped,
    /// Instruction fetch from unmapped memory.
    #[strum(to_string = "fetch from unmapped memory")]
    FetchUnmapped,
    /// Read from memory without read permission.
    #[strum(to_string = "read from protected memory")]
    ReadProtected,
    /// Write to memory without write permission.
    #[strum(to_string = "write to protected memory")]
    WriteProtected,
    /// Instruction fetch from memory without execute permission.
    #[strum(to_string = "fetch from protected memory")]
    FetchProtected,
    /// Undecodable instruction.
    #[strum(to_string = "invalid instruction")]
    InvalidInstruction,
    /// Unhandled interrupt or exception.
    #[strum(to_string = "unhandled interrupt")]
    Interrupt,
    /// Any other emulator failure.
    #[strum(to_string = "emulator failure")]
    Other,
}

impl FaultKind {
    /// Returns `true` for faults raised while fetching the next instruction.
    #[must_use]
    pub fn is_fetch(self) -> bool {
        matches!(self, FaultKind::FetchUnmapped | FaultKind::FetchProtected)
    }
}

/// An abnormal stop of guest execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CpuFault {
    /// What went wrong.
    pub kind: FaultKind,
    /// Program counter at the time of the fault.
    pub address: u64,
}

impl CpuFault {
    /// Creates a new fault record.
    #[must_use]
    pub fn new(kind: FaultKind, address: u64) -> Self {
        CpuFault { kind, address }
    }
}

impl fmt::Display for CpuFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at 0x{:X}", self.kind, self.address)
    }
}

/// Outcome of classifying a [`CpuFault`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum FaultVerdict {
    /// Expected stop; the request continues with result recovery.
    Benign,
    /// Genuine failure; the request is aborted.
    Fatal,
}

/// Decides whether a fault raised during dispatch aborts the request.
///
/// Implemented for every `FnMut(&CpuFault) -> FaultVerdict`, so ad-hoc policies can be
/// passed as closures.
///
/// # Example
///
/// ```rust
/// use drvscope::emulation::{CpuFault, FaultClassifier, FaultKind, FaultVerdict};
///
/// let mut ignore_interrupts = |fault: &CpuFault| match fault.kind {
///     FaultKind::Interrupt => FaultVerdict::Benign,
///     _ => FaultVerdict::Fatal,
/// };
///
/// let fault = CpuFault::new(FaultKind::Interrupt, 0x401000);
/// assert_eq!(ignore_interrupts.classify(&fault), FaultVerdict::Benign);
/// ```
pub trait FaultClassifier {
    /// Classifies one fault.
    fn classify(&mut self, fault: &CpuFault) -> FaultVerdict;
}

impl<F> FaultClassifier for F
where
    F: FnMut(&CpuFault) -> FaultVerdict,
{
    fn classify(&mut self, fault: &CpuFault) -> FaultVerdict {
        self(fault)
    }
}

/// Treats every fault as fatal.
#[derive(Clone, Copy, Debug, Default)]
pub struct StrictClassifier;

impl FaultClassifier for StrictClassifier {
    fn classify(&mut self, _fault: &CpuFault) -> FaultVerdict {
        FaultVerdict::Fatal
    }
}

/// Accepts the fetch fault raised when guest code returns into a known sentinel address.
///
/// Embedders typically push an unmapped return address before entering a dispatch routine;
/// the routine's final `ret` then faults on exactly that address. Any other fault is fatal.
#[derive(Clone, Copy, Debug)]
pub struct ReturnSiteClassifier {
    return_address: u64,
}

impl ReturnSiteClassifier {
    /// Creates a classifier for the given sentinel return address.
    #[must_use]
    pub fn new(return_address: u64) -> Self {
        ReturnSiteClassifier { return_address }
    }

    /// The sentinel address this classifier accepts.
    #[must_use]
    pub fn return_address(&self) -> u64 {
        self.return_address
    }
}

impl FaultClassifier for ReturnSiteClassifier {
    fn classify(&mut self, fault: &CpuFault) -> FaultVerdict {
        if fault.kind.is_fetch() && fault.address == self.return_address {
            FaultVerdict::Benign
        } else {
            FaultVerdict::Fatal
        }
    }
}
