//! Shared low-level helpers.
//!
//! - [`io`] - little-endian, bounds-checked field access used to encode and decode
//!   guest-resident structures

pub mod io;
