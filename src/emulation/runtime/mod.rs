//! Guest C runtime emulation: strings, GUIDs and the `printf` family.
//!
//! Hooks for `strlen`, `wcscpy`, `printf`, `swprintf`, `DbgPrint` and similar routines need
//! the same few primitives: decode a guest string, reconstruct a variadic argument list and
//! reproduce the guest's formatting. This module provides them as free functions over
//! [`GuestMemory`](crate::emulation::GuestMemory), so they work with any memory backend.
//!
//! - [`text`] - terminated and counted strings, GUIDs
//! - [`format`] - the format parser and renderer
//! - [`stdio`] - variadic argument fetching and `sprintf`/`printf` output
//!
//! [`EmulationSession`](crate::emulation::EmulationSession) wraps these with string capture
//! and configured limits.

pub mod format;
pub mod stdio;
pub mod text;

pub use format::{argument_count, render, string_slots, FormatArg, StringSlot};
pub use stdio::{
    emulate_printf, emulate_sprintf, encode_string, fetch_variadic_args, resolve_args,
};
pub use text::{
    decode_narrow, decode_wide, read_counted_string, read_guid, read_string, read_terminated,
    StringWidth,
};
