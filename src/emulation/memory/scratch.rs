//! Scoped tracking of per-request guest heap allocations.

use std::ops::{Deref, DerefMut};

use log::{trace, warn};

use crate::{emulation::memory::GuestHeap, Result};

/// Borrows a machine and records every heap block allocated through it.
///
/// All recorded blocks are freed exactly once: explicitly through [`release`](Self::release),
/// or implicitly when the scope is dropped on an early-return path. The scope dereferences
/// to the wrapped machine, so memory and CPU access go through it unchanged.
///
/// # Example
///
/// ```rust
/// use drvscope::emulation::{Bitness, GuestMemory, SandboxMemory, ScratchScope};
///
/// let mut memory = SandboxMemory::new(Bitness::Bit32, 4096);
/// {
///     let mut scratch = ScratchScope::new(&mut memory);
///     let block = scratch.alloc_with(b"input")?;
///     assert_eq!(scratch.read(block, 5)?, b"input");
/// }
/// assert_eq!(memory.live_allocations(), 0);
/// # Ok::<(), drvscope::Error>(())
/// ```
pub struct ScratchScope<'a, M: GuestHeap + ?Sized> {
    machine: &'a mut M,
    allocations: Vec<u64>,
}

impl<'a, M: GuestHeap + ?Sized> ScratchScope<'a, M> {
    /// Starts a new, empty scope over `machine`.
    pub fn new(machine: &'a mut M) -> Self {
        ScratchScope {
            machine,
            allocations: Vec::new(),
        }
    }

    /// Allocates `size` bytes and records the block.
    ///
    /// # Errors
    ///
    /// Returns an error if the guest heap is exhausted.
    pub fn alloc(&mut self, size: usize) -> Result<u64> {
        let address = self.machine.alloc(size)?;
        trace!("scratch alloc 0x{address:X} ({size} bytes)");
        self.allocations.push(address);
        Ok(address)
    }

    /// Addresses allocated so far, in allocation order.
    #[must_use]
    pub fn allocations(&self) -> &[u64] {
        &self.allocations
    }

    /// Frees every recorded block.
    ///
    /// Continues past failures so that one bad block cannot leak the rest; the first error
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the guest heap.
    pub fn release(mut self) -> Result<()> {
        self.free_all()
    }

    fn free_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for address in self.allocations.drain(..) {
            trace!("scratch free 0x{address:X}");
            if let Err(error) = self.machine.free(address) {
                first_error.get_or_insert(error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl<M> ScratchScope<'_, M>
where
    M: GuestHeap + crate::emulation::memory::GuestMemory + ?Sized,
{
    /// Allocates a block sized for `data`, records it and copies `data` into it.
    ///
    /// # Errors
    ///
    /// Returns an error if the heap is exhausted or the block cannot be written.
    pub fn alloc_with(&mut self, data: &[u8]) -> Result<u64> {
        let address = self.alloc(data.len())?;
        self.machine.write(address, data)?;
        Ok(address)
    }
}

impl<M: GuestHeap + ?Sized> Deref for ScratchScope<'_, M> {
    type Target = M;

    fn deref(&self) -> &M {
        self.machine
    }
}

impl<M: GuestHeap + ?Sized> DerefMut for ScratchScope<'_, M> {
    fn deref_mut(&mut self) -> &mut M {
        self.machine
    }
}

impl<M: GuestHeap + ?Sized> Drop for ScratchScope<'_, M> {
    fn drop(&mut self) {
        if self.allocations.is_empty() {
            return;
        }

        if let Err(error) = self.free_all() {
            warn!("failed to release scratch memory: {error}");
        }
    }
}
