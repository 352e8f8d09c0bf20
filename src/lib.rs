// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # drvscope
//!
//! [![Crates.io](https://img.shields.io/crates/v/drvscope.svg)](https://crates.io/crates/drvscope)
//! [![Documentation](https://docs.rs/drvscope/badge.svg)](https://docs.rs/drvscope)
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/drvscope/blob/main/LICENSE-APACHE)
//!
//! Guest operating-system emulation for binaries running under an instruction-level CPU
//! emulator. `drvscope` sits between the emulator and the hooks that replace guest API
//! calls: it records what the guest called, decodes the strings it passed, reproduces the
//! output of its `printf` calls, and delivers Windows I/O requests to an emulated kernel-mode
//! driver exactly as the I/O manager would.
//!
//! ## Features
//!
//! - **📒 Call ledger** - ordered record of intercepted calls, with an index of every string
//!   token the guest handed over
//! - **🔤 Guest strings** - narrow, wide and counted strings, GUIDs
//! - **🖨️ `printf` emulation** - C format semantics against guest memory, for `sprintf`,
//!   `printf`, `DbgPrint` and their wide variants
//! - **📨 IRP dispatch** - write and device-control requests with buffered, direct and
//!   neither I/O, bit-exact on 32-bit and 64-bit guests
//! - **🧹 No leaks** - every per-request guest allocation is released on every path,
//!   including fatal faults inside the driver
//!
//! ## Quick Start
//!
//! ```rust
//! use drvscope::prelude::*;
//!
//! let mut memory = SandboxMemory::new(Bitness::Bit64, 0x10000);
//! let name = memory.alloc_with_data(b"\\Device\\Beep\0")?;
//!
//! let mut session = EmulationSession::default();
//! let text = session.format_apply(&memory, "open %s -> %#x", &[name, 0xC0DE], false)?;
//! assert_eq!(text, "open \\Device\\Beep -> 0xc0de");
//!
//! session.record_call(0x1400_1000, "hook_NtCreateFile", vec![], ParamValue::Integer(0), 0x1400_2000);
//! assert_eq!(session.ledger().calls()[0].name, "NtCreateFile");
//! # Ok::<(), drvscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`prelude`] - Convenient re-exports of commonly used types and traits
//! - [`emulation`] - The emulation layer: session, ledger, runtime, kernel I/O
//! - [`utils`] - Bounds-checked little-endian encoding helpers
//! - [`Error`] and [`Result`] - Error handling
//!
//! ### Embedding
//!
//! The CPU emulator, guest memory and guest heap are supplied by the embedder through the
//! [`emulation::GuestMemory`], [`emulation::GuestHeap`], [`emulation::CpuEngine`] and
//! [`emulation::CallingConvention`] traits. [`emulation::SandboxMemory`] implements the
//! memory side in-process for tests and tooling.
//!
//! ### Logging
//!
//! `drvscope` logs through the [`log`](https://docs.rs/log) facade and never installs a
//! logger. Intercepted calls are reported at `info` or `debug` depending on
//! [`emulation::Verbosity`]; request construction is traced at `debug`.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use drvscope::prelude::*;
///
/// let config = EmulationConfig::quiet();
/// let session = EmulationSession::new(config);
/// assert_eq!(session.ledger().call_count(), 0);
/// ```
pub mod prelude;

/// Guest operating-system emulation.
pub mod emulation;

/// Encoding helpers shared by the emulation layer.
pub mod utils;

/// `drvscope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `drvscope` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;
