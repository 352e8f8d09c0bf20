use thiserror::Error;

use crate::emulation::EmulationError;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Guest-level failures (bad pointers, exhausted heaps, fatal faults while a driver routine was
/// running) are reported through [`Error::Emulation`], which wraps the more specific
/// [`EmulationError`]. Structural problems while encoding or decoding guest-resident kernel
/// objects surface as [`Error::OutOfBounds`] or [`Error::Malformed`].
///
/// Note that an *unsupported* I/O request (a driver that never registered the dispatch entry)
/// is not an error: it is reported through the request outcome, mirroring how the emulated
/// kernel itself reports it.
///
/// # Examples
///
/// ```rust
/// use drvscope::{Error, emulation::EmulationError};
///
/// let err: Error = EmulationError::InvalidPointer {
///     address: 0x1000,
///     reason: "address not in any allocated region",
/// }
/// .into();
///
/// match err {
///     Error::Emulation(EmulationError::InvalidPointer { address, .. }) => {
///         assert_eq!(address, 0x1000);
///     }
///     _ => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An out of bound access was attempted while encoding or decoding a structure.
    ///
    /// This is a safety check raised by the little-endian helpers in [`crate::utils::io`]
    /// when a field would extend past the end of its buffer.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A structure or value could not be represented.
    ///
    /// Raised for example when a 64-bit address has to be stored in a 32-bit guest pointer
    /// field. The error includes the source location where it was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A failure inside the emulated guest.
    ///
    /// Wraps [`EmulationError`], which carries the detailed failure mode.
    #[error("{0}")]
    Emulation(#[from] EmulationError),

    /// I/O error on a host-side stream, such as the emulated standard output.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
