//! Little-endian, bounds-checked reading and writing of guest-resident data.
//!
//! Kernel objects living in guest memory (IRPs, stack locations, MDLs, device objects) are
//! fetched as raw byte buffers and encoded/decoded field by field. This module provides the
//! primitives for that:
//!
//! - [`read_le_at`] / [`write_le_at`] - sequential access with an advancing offset
//! - [`read_le_from`] / [`write_le_into`] - access at a fixed field offset
//! - [`read_ptr_from`] / [`write_ptr_into`] - pointer-width access selected by [`Bitness`]
//!
//! Every operation is bounds-checked and fails with [`crate::Error::OutOfBounds`] instead of
//! panicking.
//!
//! # Examples
//!
//! ```rust
//! use drvscope::{emulation::Bitness, utils::io::{read_le_at, read_ptr_from, write_ptr_into}};
//!
//! let data = [0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00];
//! let mut offset = 0;
//!
//! let first: u16 = read_le_at(&data, &mut offset)?;
//! let second: u16 = read_le_at(&data, &mut offset)?;
//! let third: u32 = read_le_at(&data, &mut offset)?;
//! assert_eq!((first, second, third, offset), (1, 2, 3, 8));
//!
//! let mut buffer = [0u8; 8];
//! write_ptr_into(&mut buffer, 0, 0x1122_3344_5566_7788, Bitness::Bit64)?;
//! assert_eq!(read_ptr_from(&buffer, 4, Bitness::Bit32)?, 0x1122_3344);
//! # Ok::<(), drvscope::Error>(())
//! ```

use crate::{emulation::Bitness, Error::OutOfBounds, Result};

/// Primitive integers that can be transferred to and from guest memory.
///
/// Implemented for all fixed-width integers. The associated byte array is what actually
/// lands in guest memory, always in little-endian order.
pub trait GuestPrimitive: Sized + Copy {
    /// Byte array representation of this type.
    type Bytes: AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decode from little-endian bytes.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encode into little-endian bytes.
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_guest_primitive {
    ($($ty:ty),*) => {
        $(
            impl GuestPrimitive for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_guest_primitive!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Reads a value of type `T` at `offset` and advances the offset past it.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le_at<T: GuestPrimitive>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = T::Bytes::try_from(&data[*offset..end]) else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Writes `value` at `offset` and advances the offset past it.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn write_le_at<T: GuestPrimitive>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let end = offset.checked_add(bytes.len()).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;
    Ok(())
}

/// Reads a value of type `T` located at a fixed field offset.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le_from<T: GuestPrimitive>(data: &[u8], offset: usize) -> Result<T> {
    let mut offset = offset;
    read_le_at(data, &mut offset)
}

/// Writes `value` at a fixed field offset.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn write_le_into<T: GuestPrimitive>(data: &mut [u8], offset: usize, value: T) -> Result<()> {
    let mut offset = offset;
    write_le_at(data, &mut offset, value)
}

/// Reads a guest pointer (4 or 8 bytes depending on `bitness`) at a fixed field offset.
///
/// 32-bit pointers are zero-extended.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_ptr_from(data: &[u8], offset: usize, bitness: Bitness) -> Result<u64> {
    match bitness {
        Bitness::Bit32 => Ok(u64::from(read_le_from::<u32>(data, offset)?)),
        Bitness::Bit64 => read_le_from::<u64>(data, offset),
    }
}

/// Writes a guest pointer (4 or 8 bytes depending on `bitness`) at a fixed field offset.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short, or
/// [`crate::Error::Malformed`] if `value` does not fit into a 32-bit pointer.
pub fn write_ptr_into(data: &mut [u8], offset: usize, value: u64, bitness: Bitness) -> Result<()> {
    match bitness {
        Bitness::Bit32 => {
            let Ok(narrow) = u32::try_from(value) else {
                return Err(malformed_error!(
                    "pointer 0x{:X} does not fit a 32-bit guest",
                    value
                ));
            };
            write_le_into(data, offset, narrow)
        }
        Bitness::Bit64 => write_le_into(data, offset, value),
    }
}
