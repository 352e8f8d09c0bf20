//! The emulation session and its configuration.
//!
//! [`EmulationSession`] is what a hook layer talks to. It owns the
//! [`CallLedger`](crate::emulation::capture::CallLedger) and an [`EmulationConfig`], and
//! exposes the string, formatting, reporting and I/O request operations with those applied.
//!
//! # Workflow
//!
//! 1. Create a session with [`EmulationSession::new`]
//! 2. From each API hook, decode arguments with [`read_cstring`](EmulationSession::read_cstring)
//!    and friends, then [`record_call`](EmulationSession::record_call) and
//!    [`log_call`](EmulationSession::log_call)
//! 3. Once the driver's `DriverEntry` has run, drive it with
//!    [`io_write`](EmulationSession::io_write) and [`io_control`](EmulationSession::io_control)
//! 4. Inspect [`ledger`](EmulationSession::ledger)

mod config;
mod session;

pub use config::{
    EmulationConfig, Verbosity, DEFAULT_HOOK_PREFIX, DEFAULT_MAX_STRING_LENGTH,
    DEFAULT_VARIADIC_PREFIX,
};
pub use session::EmulationSession;
