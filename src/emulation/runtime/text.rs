//! Decoding of strings and GUIDs stored in guest memory.
//!
//! Guest strings are read forward one code unit at a time until the terminator unit, so a
//! read never touches memory past the string. Undecodable data is dropped instead of failing
//! the read: malformed guest strings are common and a partial string is more useful to a
//! hook than an error.

use strum::Display;
use widestring::U16Str;

use crate::{
    emulation::{engine::EmulationError, memory::GuestMemory},
    utils::io::read_le_from,
    Result,
};

/// Character width of a guest string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum StringWidth {
    /// Single-byte characters (`char *`), decoded as UTF-8.
    #[strum(to_string = "narrow")]
    Narrow,
    /// Two-byte characters (`wchar_t *`), decoded as UTF-16LE.
    #[strum(to_string = "wide")]
    Wide,
}

impl StringWidth {
    /// Selects wide strings when `wide` is set.
    #[must_use]
    pub fn from_wide(wide: bool) -> Self {
        if wide {
            StringWidth::Wide
        } else {
            StringWidth::Narrow
        }
    }

    /// The other width.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            StringWidth::Narrow => StringWidth::Wide,
            StringWidth::Wide => StringWidth::Narrow,
        }
    }

    /// The terminator code unit.
    #[must_use]
    pub fn terminator(self) -> &'static [u8] {
        match self {
            StringWidth::Narrow => &[0],
            StringWidth::Wide => &[0, 0],
        }
    }

    /// Size of one code unit in bytes.
    #[must_use]
    pub fn unit_size(self) -> usize {
        self.terminator().len()
    }
}

/// Reads bytes from `address` in terminator-sized chunks until a chunk equals `terminator`.
///
/// Returns the bytes preceding the terminator.
///
/// # Errors
///
/// Returns an error if the memory is unreadable, or
/// [`EmulationError::UnterminatedString`] if no terminator is found within `max_len` bytes.
pub fn read_terminated<M: GuestMemory + ?Sized>(
    memory: &M,
    address: u64,
    terminator: &[u8],
    max_len: usize,
) -> Result<Vec<u8>> {
    let unit = terminator.len().max(1);
    let mut bytes = Vec::new();
    let mut cursor = address;

    loop {
        let chunk = memory.read(cursor, unit)?;
        if chunk == terminator {
            return Ok(bytes);
        }

        bytes.extend_from_slice(&chunk);
        if bytes.len() >= max_len {
            return Err(EmulationError::UnterminatedString {
                address,
                limit: max_len,
            }
            .into());
        }

        cursor = cursor.wrapping_add(unit as u64);
    }
}

/// Decodes UTF-8, dropping invalid sequences.
#[must_use]
pub fn decode_narrow(bytes: &[u8]) -> String {
    bytes
        .utf8_chunks()
        .map(|chunk| chunk.valid())
        .collect()
}

/// Decodes UTF-16LE, dropping unpaired surrogates, a trailing odd byte and NUL characters.
#[must_use]
pub fn decode_wide(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    U16Str::from_slice(&units)
        .chars()
        .filter_map(std::result::Result::ok)
        .filter(|c| *c != '\0')
        .collect()
}

/// Reads and decodes a null-terminated guest string.
///
/// # Errors
///
/// Returns an error if the memory is unreadable or the string is unterminated.
pub fn read_string<M: GuestMemory + ?Sized>(
    memory: &M,
    address: u64,
    width: StringWidth,
    max_len: usize,
) -> Result<String> {
    let bytes = read_terminated(memory, address, width.terminator(), max_len)?;
    Ok(match width {
        StringWidth::Narrow => decode_narrow(&bytes),
        StringWidth::Wide => decode_wide(&bytes),
    })
}

/// Reads a counted `ANSI_STRING` (narrow) or `UNICODE_STRING` (wide) structure.
///
/// Both share one layout: `Length` and `MaximumLength` as `u16` at 0 and 2, followed by the
/// pointer-aligned `Buffer`. `Length` is in bytes and excludes any terminator.
///
/// # Errors
///
/// Returns an error if the structure or its buffer is unreadable.
pub fn read_counted_string<M: GuestMemory + ?Sized>(
    memory: &M,
    address: u64,
    width: StringWidth,
) -> Result<String> {
    let pointer_size = memory.bitness().pointer_size();
    let header = memory.read(address, pointer_size * 2)?;

    let length: u16 = read_le_from(&header, 0)?;
    let buffer = memory.unpack_pointer(&header[pointer_size..])?;
    if length == 0 || buffer == 0 {
        return Ok(String::new());
    }

    let bytes = memory.read(buffer, usize::from(length))?;
    Ok(match width {
        StringWidth::Narrow => decode_narrow(&bytes),
        StringWidth::Wide => decode_wide(&bytes),
    })
}

/// Reads a 16-byte GUID in its native little-endian field order.
///
/// # Errors
///
/// Returns an error if the memory is unreadable.
pub fn read_guid<M: GuestMemory + ?Sized>(memory: &M, address: u64) -> Result<uguid::Guid> {
    let data = memory.read(address, 16)?;
    let Ok(buffer) = <[u8; 16]>::try_from(data.as_slice()) else {
        return Err(crate::Error::OutOfBounds);
    };

    Ok(uguid::Guid::from_bytes(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::{Bitness, GuestHeap, SandboxMemory};

    fn memory_with(data: &[u8]) -> (SandboxMemory, u64) {
        let mut memory = SandboxMemory::new(Bitness::Bit32, 4096);
        let address = memory.alloc_with_data(data).unwrap();
        (memory, address)
    }

    #[test]
    fn narrow_until_terminator() {
        let (memory, address) = memory_with(b"hello\0world\0");
        assert_eq!(
            read_string(&memory, address, StringWidth::Narrow, 256).unwrap(),
            "hello"
        );
        assert_eq!(
            read_string(&memory, address + 6, StringWidth::Narrow, 256).unwrap(),
            "world"
        );
    }

    #[test]
    fn narrow_drops_invalid_bytes() {
        let (memory, address) = memory_with(b"a\xFFb\xC3\xA9\0");
        assert_eq!(
            read_string(&memory, address, StringWidth::Narrow, 256).unwrap(),
            "ab\u{e9}"
        );
    }

    #[test]
    fn wide_strips_embedded_nul() {
        let (memory, address) = memory_with(&[b'a', 0, b'b', 0, 0, 0]);
        let text = read_string(&memory, address, StringWidth::Wide, 256).unwrap();
        assert_eq!(text, "ab");
        assert!(!text.contains('\0'));
    }

    #[test]
    fn wide_terminator_is_unit_aligned() {
        // 0x0100 followed by 0x0041: the zero bytes straddle two units and do not terminate.
        let (memory, address) = memory_with(&[0x00, 0x01, 0x00, 0x41, 0x00, 0x00]);
        assert_eq!(
            read_string(&memory, address, StringWidth::Wide, 256).unwrap(),
            "\u{100}\u{4100}"
        );
    }

    #[test]
    fn wide_drops_unpaired_surrogate() {
        let (memory, address) = memory_with(&[0x00, 0xD8, b'x', 0, 0, 0]);
        assert_eq!(
            read_string(&memory, address, StringWidth::Wide, 256).unwrap(),
            "x"
        );
    }

    #[test]
    fn unterminated_is_bounded() {
        let (memory, address) = memory_with(b"abcdefgh\0");
        assert!(matches!(
            read_string(&memory, address, StringWidth::Narrow, 4),
            Err(crate::Error::Emulation(EmulationError::UnterminatedString {
                limit: 4,
                ..
            }))
        ));
    }

    #[test]
    fn unmapped_read_fails() {
        let memory = SandboxMemory::new(Bitness::Bit64, 4096);
        assert!(read_string(&memory, 0x1234, StringWidth::Narrow, 16).is_err());
    }

    #[test]
    fn counted_unicode_string() {
        let mut memory = SandboxMemory::new(Bitness::Bit64, 4096);
        let buffer = memory.alloc_with_data(&[b'C', 0, b':', 0, 0, 0]).unwrap();

        let mut header = vec![0u8; 16];
        header[0] = 4;
        header[2] = 6;
        header[8..16].copy_from_slice(&buffer.to_le_bytes());
        let address = memory.alloc_with_data(&header).unwrap();

        assert_eq!(
            read_counted_string(&memory, address, StringWidth::Wide).unwrap(),
            "C:"
        );
    }

    #[test]
    fn guid_little_endian_fields() {
        let bytes = [
            0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF,
        ];
        let (memory, address) = memory_with(&bytes);

        let guid = read_guid(&memory, address).unwrap();
        assert_eq!(guid.to_string(), "00112233-4455-6677-8899-aabbccddeeff");
    }
}
