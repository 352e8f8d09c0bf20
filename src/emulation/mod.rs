//! Guest operating-system emulation on top of an instruction-level CPU emulator.
//!
//! The CPU emulator, the guest's virtual memory and its heap belong to the embedder. This
//! module adds the operating-system layer a hook needs: recording intercepted calls,
//! decoding guest strings, reproducing `printf`-style output, and delivering Windows I/O
//! requests to an emulated kernel-mode driver.
//!
//! # Architecture
//!
//! - [`capture`] - the call ledger and call reporting
//! - [`runtime`] - guest strings, GUIDs and the `printf` family
//! - [`kernel`] - IRP construction and dispatch for write and device-control requests
//! - memory and engine interfaces - [`GuestMemory`], [`GuestHeap`], [`CpuEngine`],
//!   [`CallingConvention`] and [`FaultClassifier`], implemented by the embedder
//! - [`EmulationSession`] - the configured entry point tying these together
//!
//! # Key Components
//!
//! ## Collaborators
//! - [`GuestMachine`] - everything a request needs from the embedder, in one bound
//! - [`SandboxMemory`] - an in-process memory and heap for tests and tooling
//! - [`ScratchScope`] - releases per-request allocations on every exit path
//!
//! ## Kernel I/O
//! - [`kernel::IoRequestEmulator`] - builds, dispatches and recovers one request
//! - [`kernel::DriverObject`] - the loaded driver's device and dispatch table
//! - [`kernel::IoctlCode`] - packed device-control codes
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use drvscope::emulation::{kernel::IoctlCode, EmulationSession, ReturnSiteClassifier};
//!
//! let session = EmulationSession::default();
//!
//! // `machine` wraps the embedder's CPU emulator; `driver` is the loaded driver object.
//! let outcome = session.io_write(&mut machine, &driver, ReturnSiteClassifier::new(stop), b"PAYLOAD")?;
//! assert!(outcome.success);
//!
//! let code = IoctlCode::from(0x0022_2004);
//! let reply = session.io_control(&mut machine, &driver, ReturnSiteClassifier::new(stop), code, 64, b"ping")?;
//! ```
//!
//! # Thread Safety
//!
//! Everything here is single-threaded. Collaborators are borrowed mutably for the duration of
//! one operation, so no two requests can overlap.

pub mod capture;
mod engine;
pub mod kernel;
mod memory;
mod process;
pub mod runtime;

pub use engine::{
    CallingConvention, CpuEngine, CpuFault, Detour, EmulationError, FaultClassifier, FaultKind,
    FaultVerdict, GuestMachine, ParamKind, ReturnSiteClassifier, StrictClassifier,
};
pub use memory::{Bitness, GuestHeap, GuestMemory, SandboxMemory, ScratchScope};
pub use process::{
    EmulationConfig, EmulationSession, Verbosity, DEFAULT_HOOK_PREFIX, DEFAULT_MAX_STRING_LENGTH,
    DEFAULT_VARIADIC_PREFIX,
};
