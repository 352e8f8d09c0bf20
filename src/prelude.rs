//! # drvscope Prelude
//!
//! The types most hooks and embedders need, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all drvscope operations
pub use crate::Error;

/// The result type used throughout drvscope
pub use crate::Result;

/// Guest-level failure modes
pub use crate::emulation::EmulationError;

// ================================================================================================
// Session
// ================================================================================================

/// Entry point for hooks, with its configuration
pub use crate::emulation::{EmulationConfig, EmulationSession, Verbosity};

/// Call ledger records
pub use crate::emulation::capture::{CallLedger, CallRecord, CallReport, ParamValue};

// ================================================================================================
// Collaborators
// ================================================================================================

/// Memory and heap interfaces and the in-process implementation
pub use crate::emulation::{Bitness, GuestHeap, GuestMemory, SandboxMemory};

/// CPU interfaces and fault handling
pub use crate::emulation::{
    CallingConvention, CpuEngine, CpuFault, FaultClassifier, FaultKind, FaultVerdict,
    GuestMachine, ParamKind, ReturnSiteClassifier, StrictClassifier,
};

// ================================================================================================
// Kernel I/O
// ================================================================================================

/// Request emulation
pub use crate::emulation::kernel::{
    DriverDispatchTable, DriverObject, IoRequestEmulator, IoctlCode, IoctlOutcome, MajorFunction,
    NtStatus, TransferMethod, WriteOutcome,
};

// ================================================================================================
// Runtime
// ================================================================================================

/// Guest string width and resolved format arguments
pub use crate::emulation::runtime::{FormatArg, StringWidth};
