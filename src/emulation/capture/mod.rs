//! Call capture: the ledger of intercepted calls and their reporting.
//!
//! - [`CallLedger`] records every intercepted call in order and indexes the string tokens
//!   observed between calls
//! - [`report`] renders calls as log lines
//!
//! The ledger is owned by an [`EmulationSession`](crate::emulation::EmulationSession); it
//! never touches guest memory.

mod ledger;
pub mod report;
mod types;

pub use ledger::CallLedger;
pub use report::{describe_call, log_call, push_variadic_params, stringify, CallReport};
pub use types::{CallRecord, ParamValue};
