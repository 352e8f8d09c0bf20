//! Self-contained guest memory and heap.
//!
//! This module provides [`SandboxMemory`], an implementation of [`GuestMemory`] and
//! [`GuestHeap`] backed by host allocations. It lets the emulation core run without a full
//! CPU emulator: tests, benches and simple embedders map the guest data they need and let
//! the I/O request emulator allocate its kernel objects from the sandbox heap.
//!
//! # Address Space
//!
//! Each allocation gets a unique base address in a simulated address space starting at
//! `0x1000_0000` for 32-bit guests and `0x7FFF_0000_0000` for 64-bit guests. Allocations are
//! aligned to 16 bytes and addresses are never reused, so a stale pointer into a freed block
//! is always detected.
//!
//! # Memory Limits
//!
//! The sandbox has a configurable maximum size (default 16MB) to prevent runaway
//! allocations. Exceeding this limit returns
//! [`EmulationError::HeapMemoryLimitExceeded`].

use std::collections::BTreeMap;

use crate::{
    emulation::{
        engine::EmulationError,
        memory::{Bitness, GuestHeap, GuestMemory},
    },
    Result,
};

const BASE_ADDRESS_32: u64 = 0x1000_0000;
const BASE_ADDRESS_64: u64 = 0x7FFF_0000_0000;

/// An allocated region of sandbox memory (internal).
///
/// The `valid` flag is cleared when the region is freed; the region stays in the map so that
/// use-after-free and double free are reported instead of silently hitting other data.
#[derive(Clone, Debug)]
struct Region {
    data: Vec<u8>,
    valid: bool,
}

impl Region {
    fn new(data: Vec<u8>) -> Self {
        Region { data, valid: true }
    }

    #[inline]
    fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn contains(&self, base: u64, address: u64) -> bool {
        address >= base && address - base < self.size() as u64
    }
}

/// Host-backed guest memory with a bump-style heap.
///
/// # Example
///
/// ```rust
/// use drvscope::emulation::{Bitness, GuestHeap, GuestMemory, SandboxMemory};
///
/// let mut mem = SandboxMemory::new(Bitness::Bit64, 1024 * 1024);
///
/// let text = mem.map(0x40_0000, b"hello\0")?;
/// assert_eq!(mem.read(text + 1, 4)?, b"ello");
///
/// let block = mem.alloc(32)?;
/// mem.free(block)?;
/// assert!(mem.read(block, 1).is_err());
/// # Ok::<(), drvscope::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct SandboxMemory {
    bitness: Bitness,
    /// Memory regions indexed by their base address.
    regions: BTreeMap<u64, Region>,
    /// Next address handed out by the heap.
    next_address: u64,
    /// Total bytes currently live.
    current_size: usize,
    max_size: usize,
    allocations: usize,
    releases: usize,
}

impl SandboxMemory {
    /// Creates an empty sandbox with the specified size limit.
    ///
    /// # Arguments
    ///
    /// * `bitness` - Word size of the emulated guest
    /// * `max_size` - Maximum total size of live regions in bytes
    #[must_use]
    pub fn new(bitness: Bitness, max_size: usize) -> Self {
        let next_address = match bitness {
            Bitness::Bit32 => BASE_ADDRESS_32,
            Bitness::Bit64 => BASE_ADDRESS_64,
        };

        SandboxMemory {
            bitness,
            regions: BTreeMap::new(),
            next_address,
            current_size: 0,
            max_size,
            allocations: 0,
            releases: 0,
        }
    }

    /// Maps `data` at a fixed guest address.
    ///
    /// Used to place guest-resident objects the emulation core only reads, such as a device
    /// object or a format string, at the address the guest expects them. Mapped regions are
    /// not counted as heap allocations.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The range overlaps an existing region
    /// - The range does not fit the guest's address space
    /// - Mapping would exceed the memory limit
    pub fn map(&mut self, address: u64, data: &[u8]) -> Result<u64> {
        let size = data.len().max(1);
        let end = address
            .checked_add(size as u64)
            .filter(|end| self.bitness == Bitness::Bit64 || *end <= u64::from(u32::MAX) + 1)
            .ok_or(EmulationError::InvalidPointer {
                address,
                reason: "region exceeds the guest address space",
            })?;

        let overlaps = self
            .regions
            .range(..end)
            .next_back()
            .is_some_and(|(&base, region)| base + region.size() as u64 > address);
        if overlaps {
            return Err(EmulationError::InvalidPointer {
                address,
                reason: "address already allocated",
            }
            .into());
        }

        self.reserve(size)?;

        let mut storage = vec![0; size];
        storage[..data.len()].copy_from_slice(data);
        self.regions.insert(address, Region::new(storage));

        if end > self.next_address {
            self.next_address = end.saturating_add(15) & !15;
        }

        Ok(address)
    }

    /// Allocates a heap block and initializes it with `data`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::HeapMemoryLimitExceeded`] if allocation would exceed the
    /// memory limit.
    pub fn alloc_with_data(&mut self, data: &[u8]) -> Result<u64> {
        let address = self.alloc(data.len())?;
        self.write(address, data)?;
        Ok(address)
    }

    /// Returns `true` if the address is within a live region.
    #[must_use]
    pub fn is_valid(&self, address: u64) -> bool {
        self.find_region(address).is_some()
    }

    /// Returns the total size of live regions in bytes.
    #[must_use]
    pub fn current_size(&self) -> usize {
        self.current_size
    }

    /// Returns the maximum allowed size of live regions in bytes.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of heap blocks allocated and not yet freed.
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.allocations - self.releases
    }

    /// Number of heap blocks ever allocated.
    #[must_use]
    pub fn total_allocations(&self) -> usize {
        self.allocations
    }

    /// Number of heap blocks ever freed.
    #[must_use]
    pub fn total_releases(&self) -> usize {
        self.releases
    }

    fn reserve(&mut self, size: usize) -> Result<()> {
        let Some(total) = self
            .current_size
            .checked_add(size)
            .filter(|total| *total <= self.max_size)
        else {
            return Err(EmulationError::HeapMemoryLimitExceeded {
                current: self.current_size,
                limit: self.max_size,
            }
            .into());
        };

        self.current_size = total;
        Ok(())
    }

    fn limit_exceeded(&self) -> crate::Error {
        EmulationError::HeapMemoryLimitExceeded {
            current: self.current_size,
            limit: self.max_size,
        }
        .into()
    }

    fn find_region(&self, address: u64) -> Option<(&Region, usize)> {
        let (&base, region) = self.regions.range(..=address).next_back()?;
        if !region.valid || !region.contains(base, address) {
            return None;
        }

        #[allow(clippy::cast_possible_truncation)] // Offset bounded by region size
        let offset = (address - base) as usize;
        Some((region, offset))
    }

    fn find_region_mut(&mut self, address: u64) -> Option<(&mut Region, usize)> {
        let (&base, region) = self.regions.range_mut(..=address).next_back()?;
        if !region.valid || !region.contains(base, address) {
            return None;
        }

        #[allow(clippy::cast_possible_truncation)] // Offset bounded by region size
        let offset = (address - base) as usize;
        Some((region, offset))
    }
}

impl Default for SandboxMemory {
    fn default() -> Self {
        Self::new(Bitness::Bit64, 16 * 1024 * 1024)
    }
}

impl GuestMemory for SandboxMemory {
    fn bitness(&self) -> Bitness {
        self.bitness
    }

    fn read(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let (region, offset) = self
            .find_region(address)
            .ok_or(EmulationError::InvalidPointer {
                address,
                reason: "address not in any allocated region",
            })?;

        if offset.checked_add(len).filter(|end| *end <= region.size()).is_none() {
            return Err(EmulationError::InvalidPointer {
                address,
                reason: "read would exceed region bounds",
            }
            .into());
        }

        Ok(region.data[offset..offset + len].to_vec())
    }

    fn write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        let (region, offset) =
            self.find_region_mut(address)
                .ok_or(EmulationError::InvalidPointer {
                    address,
                    reason: "address not in any allocated region",
                })?;

        if offset
            .checked_add(data.len())
            .filter(|end| *end <= region.size())
            .is_none()
        {
            return Err(EmulationError::InvalidPointer {
                address,
                reason: "write would exceed region bounds",
            }
            .into());
        }

        region.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl GuestHeap for SandboxMemory {
    fn alloc(&mut self, size: usize) -> Result<u64> {
        let size = size.max(1);
        let address = self.next_address;
        let end = u64::try_from(size)
            .ok()
            .and_then(|size| address.checked_add(size))
            .filter(|end| self.bitness == Bitness::Bit64 || *end <= u64::from(u32::MAX) + 1)
            .ok_or_else(|| self.limit_exceeded())?;

        self.reserve(size)?;

        // Align next allocation to 16 bytes
        self.next_address = end.saturating_add(15) & !15;
        self.regions.insert(address, Region::new(vec![0; size]));
        self.allocations += 1;

        Ok(address)
    }

    fn free(&mut self, address: u64) -> Result<()> {
        if let Some(region) = self.regions.get_mut(&address) {
            if region.valid {
                region.valid = false;
                self.current_size = self.current_size.saturating_sub(region.size());
                self.releases += 1;
                return Ok(());
            }
        }

        Err(EmulationError::InvalidPointer {
            address,
            reason: "not a valid allocation or already freed",
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_free() {
        let mut mem = SandboxMemory::new(Bitness::Bit32, 1024);

        let ptr = mem.alloc(100).unwrap();
        assert!(mem.is_valid(ptr));
        assert_eq!(mem.live_allocations(), 1);

        mem.free(ptr).unwrap();
        assert!(!mem.is_valid(ptr));
        assert_eq!(mem.live_allocations(), 0);
        assert_eq!(mem.current_size(), 0);
    }

    #[test]
    fn test_double_free() {
        let mut mem = SandboxMemory::new(Bitness::Bit64, 1024);

        let ptr = mem.alloc(8).unwrap();
        mem.free(ptr).unwrap();
        assert!(mem.free(ptr).is_err());
        assert_eq!(mem.total_releases(), 1);
    }

    #[test]
    fn test_alignment_and_base() {
        let mut mem = SandboxMemory::new(Bitness::Bit32, 1024);

        let first = mem.alloc(3).unwrap();
        let second = mem.alloc(0).unwrap();
        assert_eq!(first, BASE_ADDRESS_32);
        assert_eq!(second, BASE_ADDRESS_32 + 16);
        assert_eq!(mem.read(second, 1).unwrap(), [0]);
    }

    #[test]
    fn test_offset_access() {
        let mut mem = SandboxMemory::new(Bitness::Bit64, 1024);

        let ptr = mem.alloc(32).unwrap();
        mem.write(ptr + 8, &[0xAB, 0xCD]).unwrap();

        assert_eq!(mem.read(ptr + 8, 2).unwrap(), [0xAB, 0xCD]);
        assert_eq!(mem.read(ptr, 2).unwrap(), [0, 0]);
    }

    #[test]
    fn test_oversized_requests_are_errors() {
        let mut mem = SandboxMemory::new(Bitness::Bit64, 1024);

        assert!(matches!(
            mem.alloc(usize::MAX),
            Err(crate::Error::Emulation(
                EmulationError::HeapMemoryLimitExceeded { .. }
            ))
        ));
        assert_eq!(mem.current_size(), 0);

        let ptr = mem.alloc(8).unwrap();
        assert!(mem.read(ptr + 4, usize::MAX).is_err());
        assert_eq!(mem.live_allocations(), 1);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut mem = SandboxMemory::new(Bitness::Bit64, 1024);

        let ptr = mem.alloc(8).unwrap();
        assert!(mem.read(ptr, 16).is_err());
        assert!(mem.write(ptr, &[0; 16]).is_err());
        assert!(mem.read(ptr - 1, 1).is_err());
    }

    #[test]
    fn test_memory_limit() {
        let mut mem = SandboxMemory::new(Bitness::Bit64, 100);

        let _first = mem.alloc(50).unwrap();
        assert!(matches!(
            mem.alloc(60),
            Err(crate::Error::Emulation(
                EmulationError::HeapMemoryLimitExceeded { .. }
            ))
        ));
    }

    #[test]
    fn test_map_fixed_address() {
        let mut mem = SandboxMemory::new(Bitness::Bit32, 1024);

        mem.map(0x40_0000, b"abc").unwrap();
        assert_eq!(mem.read(0x40_0001, 2).unwrap(), b"bc");
        assert!(mem.map(0x40_0002, b"x").is_err());
        assert!(mem.map(0xFFFF_FFFF, b"xy").is_err());
        assert_eq!(mem.total_allocations(), 0);
    }

    #[test]
    fn test_pointer_roundtrip_width() {
        let mut mem = SandboxMemory::new(Bitness::Bit32, 1024);

        let ptr = mem.alloc(8).unwrap();
        mem.write_pointer(ptr, 0xCAFE_BABE).unwrap();
        assert_eq!(mem.read(ptr, 4).unwrap(), [0xBE, 0xBA, 0xFE, 0xCA]);
        assert!(mem.write_pointer(ptr, 0x1_0000_0000).is_err());
    }
}
