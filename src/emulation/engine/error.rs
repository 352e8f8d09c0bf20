//! Emulation error types.
//!
//! This module defines the failure modes of guest-level emulation: bad guest pointers,
//! exhausted guest heaps, runaway string reads, format argument shortfalls and fatal CPU
//! faults while a driver dispatch routine was running.

use std::fmt;

use crate::emulation::engine::fault::CpuFault;

/// Errors that can occur while emulating guest operating-system behavior.
#[derive(Debug, Clone, PartialEq)]
pub enum EmulationError {
    /// Invalid pointer access.
    InvalidPointer {
        /// The invalid address.
        address: u64,
        /// Reason for invalidity.
        reason: &'static str,
    },
    /// Heap memory limit exceeded.
    HeapMemoryLimitExceeded {
        /// Current heap size.
        current: usize,
        /// Maximum allowed size.
        limit: usize,
    },
    /// No terminator was found within the maximum string length.
    UnterminatedString {
        /// Address the read started at.
        address: u64,
        /// Maximum number of bytes scanned.
        limit: usize,
    },
    /// A format conversion had no matching argument.
    FormatArgumentMissing {
        /// Zero-based index of the missing argument.
        index: usize,
    },
    /// A major function code outside `0..=IRP_MJ_MAXIMUM_FUNCTION`.
    InvalidMajorFunction {
        /// The offending code.
        code: u8,
    },
    /// A fault classified as fatal while a dispatch routine was running.
    DispatchFault {
        /// Entry point of the dispatch routine.
        routine: u64,
        /// The fault that stopped execution.
        fault: CpuFault,
    },
}

impl fmt::Display for EmulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmulationError::InvalidPointer { address, reason } => {
                write!(f, "invalid pointer 0x{address:X}: {reason}")
            }
            EmulationError::HeapMemoryLimitExceeded { current, limit } => {
                write!(
                    f,
                    "guest heap limit exceeded (current: {current}, limit: {limit})"
                )
            }
            EmulationError::UnterminatedString { address, limit } => {
                write!(
                    f,
                    "no string terminator within {limit} bytes of 0x{address:X}"
                )
            }
            EmulationError::FormatArgumentMissing { index } => {
                write!(f, "format conversion {index} has no matching argument")
            }
            EmulationError::InvalidMajorFunction { code } => {
                write!(f, "invalid major function code 0x{code:02X}")
            }
            EmulationError::DispatchFault { routine, fault } => {
                write!(f, "dispatch routine 0x{routine:X} faulted: {fault}")
            }
        }
    }
}

impl std::error::Error for EmulationError {}

impl EmulationError {
    /// Checks if this error was raised by guest code rather than by a collaborator.
    #[must_use]
    pub fn is_guest_fault(&self) -> bool {
        matches!(self, EmulationError::DispatchFault { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::engine::fault::FaultKind;

    #[test]
    fn test_error_display() {
        let errors = vec![
            EmulationError::InvalidPointer {
                address: 0x1000,
                reason: "address not in any allocated region",
            },
            EmulationError::HeapMemoryLimitExceeded {
                current: 10,
                limit: 5,
            },
            EmulationError::UnterminatedString {
                address: 0x2000,
                limit: 4096,
            },
            EmulationError::FormatArgumentMissing { index: 2 },
            EmulationError::InvalidMajorFunction { code: 0x1C },
        ];

        for err in errors {
            let display = format!("{err}");
            assert!(!display.is_empty());
        }
    }

    #[test]
    fn test_dispatch_fault() {
        let err = EmulationError::DispatchFault {
            routine: 0x401000,
            fault: CpuFault::new(FaultKind::ReadUnmapped, 0x401010),
        };
        assert!(err.is_guest_fault());
        assert!(format!("{err}").contains("0x401000"));
        assert!(format!("{err}").contains("0x401010"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EmulationError>();
    }
}
