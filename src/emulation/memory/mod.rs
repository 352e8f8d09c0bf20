//! Guest memory model.
//!
//! The guest's virtual memory and its heap are owned by the embedding emulator; this crate
//! only consumes them through two small traits:
//!
//! - [`GuestMemory`] - byte-exact reads and writes at guest addresses, plus pointer packing
//!   according to the guest's [`Bitness`]
//! - [`GuestHeap`] - allocation and release of guest heap blocks
//!
//! On top of these, the module provides:
//!
//! - [`SandboxMemory`] - a self-contained implementation of both traits, backed by host
//!   allocations, for driving the emulation core without a full CPU emulator
//! - [`ScratchScope`] - a guard that tracks every heap block allocated while servicing one
//!   request and releases all of them on every exit path
//!
//! # Example
//!
//! ```rust
//! use drvscope::emulation::{Bitness, GuestHeap, GuestMemory, SandboxMemory};
//!
//! let mut memory = SandboxMemory::new(Bitness::Bit32, 1024 * 1024);
//! let block = memory.alloc(8)?;
//! memory.write_pointer(block, 0x0040_1000)?;
//! assert_eq!(memory.read_pointer(block)?, 0x0040_1000);
//! # Ok::<(), drvscope::Error>(())
//! ```

mod sandbox;
mod scratch;

pub use sandbox::SandboxMemory;
pub use scratch::ScratchScope;

use strum::{Display, EnumIter};

use crate::{
    utils::io::{read_ptr_from, write_ptr_into},
    Result,
};

/// Processor word size of the emulated guest.
///
/// Selects pointer width and, through it, which of the two native layouts of every
/// word-size-dependent kernel structure is used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Bitness {
    /// 32-bit guest (x86, ARM).
    #[strum(to_string = "32-bit")]
    Bit32,
    /// 64-bit guest (x86-64, AArch64).
    #[strum(to_string = "64-bit")]
    Bit64,
}

impl Bitness {
    /// Size of a guest pointer in bytes.
    #[must_use]
    pub const fn pointer_size(self) -> usize {
        match self {
            Bitness::Bit32 => 4,
            Bitness::Bit64 => 8,
        }
    }

    /// Number of bits in a guest word.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Bitness::Bit32 => 32,
            Bitness::Bit64 => 64,
        }
    }
}

/// Byte-exact access to the guest's virtual memory.
///
/// Implemented by the embedding emulator. Reads take `&self` so that decoding helpers can
/// share the accessor; writes require exclusive access.
pub trait GuestMemory {
    /// Word size of the guest this memory belongs to.
    fn bitness(&self) -> Bitness;

    /// Reads `len` bytes starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if any part of the range is not mapped.
    fn read(&self, address: u64, len: usize) -> Result<Vec<u8>>;

    /// Writes `data` starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if any part of the range is not mapped.
    fn write(&mut self, address: u64, data: &[u8]) -> Result<()>;

    /// Encodes `value` as a little-endian guest pointer.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` does not fit the guest's pointer width.
    fn pack_pointer(&self, value: u64) -> Result<Vec<u8>> {
        let bitness = self.bitness();
        let mut bytes = vec![0u8; bitness.pointer_size()];
        write_ptr_into(&mut bytes, 0, value, bitness)?;
        Ok(bytes)
    }

    /// Decodes a little-endian guest pointer.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is shorter than a guest pointer.
    fn unpack_pointer(&self, bytes: &[u8]) -> Result<u64> {
        read_ptr_from(bytes, 0, self.bitness())
    }

    /// Reads one guest pointer at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory is not mapped.
    fn read_pointer(&self, address: u64) -> Result<u64> {
        let bytes = self.read(address, self.bitness().pointer_size())?;
        self.unpack_pointer(&bytes)
    }

    /// Writes one guest pointer at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory is not mapped or `value` does not fit.
    fn write_pointer(&mut self, address: u64, value: u64) -> Result<()> {
        let bytes = self.pack_pointer(value)?;
        self.write(address, &bytes)
    }
}

/// The heap allocator operating inside guest memory.
pub trait GuestHeap {
    /// Allocates `size` bytes of guest memory and returns the block's address.
    ///
    /// # Errors
    ///
    /// Returns an error if the heap is exhausted.
    fn alloc(&mut self, size: usize) -> Result<u64>;

    /// Releases a block previously returned by [`alloc`](Self::alloc).
    ///
    /// # Errors
    ///
    /// Returns an error if `address` is not a live allocation.
    fn free(&mut self, address: u64) -> Result<()>;
}
