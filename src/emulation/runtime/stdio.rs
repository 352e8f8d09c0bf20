//! Guest `printf` family: variadic argument fetching, string resolution and output.

use std::io::Write;

use log::trace;
use widestring::U16String;

use crate::{
    emulation::{
        memory::GuestMemory,
        runtime::{
            format::{argument_count, render, string_slots, FormatArg, StringSlot},
            text::StringWidth,
        },
    },
    Result,
};

/// Reads the variadic words `format` consumes, starting at `pointer`.
///
/// One word is read per `%` (`%%` counts twice), or per consumed argument including `*`
/// widths and precisions, whichever is larger. Extra words are ignored by [`render`].
///
/// # Errors
///
/// Returns an error if any of the words is unreadable.
pub fn fetch_variadic_args<M: GuestMemory + ?Sized>(
    memory: &M,
    format: &str,
    pointer: u64,
) -> Result<Vec<u64>> {
    let count = format.matches('%').count().max(argument_count(format));
    let step = memory.bitness().pointer_size() as u64;

    (0..count as u64)
        .map(|index| memory.read_pointer(pointer.wrapping_add(index * step)))
        .collect()
}

/// Replaces the raw word behind every string conversion with the text `resolve` returns.
///
/// `resolve` is not called for null pointers; those become `(null)`. Slots beyond the end of
/// `words` are left for [`render`] to report.
///
/// # Errors
///
/// Propagates the first error returned by `resolve`.
pub fn resolve_args<R>(
    format: &str,
    words: &[u64],
    width: StringWidth,
    mut resolve: R,
) -> Result<Vec<FormatArg>>
where
    R: FnMut(u64, &StringSlot) -> Result<String>,
{
    let mut args: Vec<FormatArg> = words.iter().copied().map(FormatArg::Int).collect();

    for slot in string_slots(format, width) {
        let Some(FormatArg::Int(address)) = args.get(slot.index) else {
            continue;
        };

        let text = if *address == 0 {
            "(null)".to_string()
        } else {
            resolve(*address, &slot)?
        };
        args[slot.index] = FormatArg::Str(text);
    }

    Ok(args)
}

/// Encodes `text` the way the guest stores it, including the terminator.
#[must_use]
pub fn encode_string(text: &str, width: StringWidth) -> Vec<u8> {
    match width {
        StringWidth::Narrow => {
            let mut bytes = Vec::with_capacity(text.len() + 1);
            bytes.extend_from_slice(text.as_bytes());
            bytes.push(0);
            bytes
        }
        StringWidth::Wide => {
            let wide = U16String::from_str(text);
            let mut bytes = Vec::with_capacity((wide.len() + 1) * 2);
            for unit in wide.as_slice() {
                bytes.extend_from_slice(&unit.to_le_bytes());
            }
            bytes.extend_from_slice(&[0, 0]);
            bytes
        }
    }
}

/// Writes already formatted text to `buffer` as `sprintf` would.
///
/// Returns the number of characters written, terminator excluded.
///
/// # Errors
///
/// Returns an error if the guest buffer is not writable.
pub fn write_formatted<M: GuestMemory + ?Sized>(
    memory: &mut M,
    buffer: u64,
    text: &str,
    width: StringWidth,
) -> Result<usize> {
    let bytes = encode_string(text, width);
    memory.write(buffer, &bytes)?;
    trace!("sprintf wrote {} bytes at 0x{buffer:X}", bytes.len());

    Ok(text.chars().count())
}

/// Writes already formatted text to the emulated standard output as `printf` would.
///
/// Returns the number of characters written.
///
/// # Errors
///
/// Returns an error if the host stream fails.
pub fn print_formatted<W: Write + ?Sized>(out: &mut W, text: &str) -> Result<usize> {
    out.write_all(text.as_bytes())?;
    Ok(text.chars().count())
}

/// Formats `format` against guest words and writes it to guest memory.
///
/// String arguments are read with `read`, which receives the pointer and the slot that
/// consumes it.
///
/// # Errors
///
/// Returns an error if a string cannot be read, the format runs out of arguments or the
/// buffer is not writable.
pub fn emulate_sprintf<M, R>(
    memory: &mut M,
    buffer: u64,
    format: &str,
    words: &[u64],
    width: StringWidth,
    read: R,
) -> Result<usize>
where
    M: GuestMemory + ?Sized,
    R: FnMut(&M, u64, &StringSlot) -> Result<String>,
{
    let text = apply(memory, format, words, width, read)?;
    write_formatted(memory, buffer, &text, width)
}

/// Formats `format` against guest words and writes the UTF-8 result to `out`.
///
/// # Errors
///
/// Returns an error if a string cannot be read, the format runs out of arguments or the
/// stream fails.
pub fn emulate_printf<M, R, W>(
    memory: &M,
    out: &mut W,
    format: &str,
    words: &[u64],
    width: StringWidth,
    read: R,
) -> Result<usize>
where
    M: GuestMemory + ?Sized,
    R: FnMut(&M, u64, &StringSlot) -> Result<String>,
    W: Write + ?Sized,
{
    let text = apply(memory, format, words, width, read)?;
    print_formatted(out, &text)
}

fn apply<M, R>(memory: &M, format: &str, words: &[u64], width: StringWidth, mut read: R) -> Result<String>
where
    M: GuestMemory + ?Sized,
    R: FnMut(&M, u64, &StringSlot) -> Result<String>,
{
    let args = resolve_args(format, words, width, |address, slot| read(memory, address, slot))?;
    render(format, &args, memory.bitness(), width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::{
        runtime::text::{read_counted_string, read_string},
        Bitness, GuestHeap, SandboxMemory,
    };

    fn read_plain(memory: &SandboxMemory, address: u64, slot: &StringSlot) -> Result<String> {
        if slot.counted {
            read_counted_string(memory, address, slot.width)
        } else {
            read_string(memory, address, slot.width, 256)
        }
    }

    #[test]
    fn variadic_words_follow_pointer_width() {
        let mut memory = SandboxMemory::new(Bitness::Bit64, 4096);
        let mut data = Vec::new();
        for word in [7u64, 0x1122_3344_5566_7788, 9] {
            data.extend_from_slice(&word.to_le_bytes());
        }
        let pointer = memory.alloc_with_data(&data).unwrap();

        let words = fetch_variadic_args(&memory, "%d %llx", pointer).unwrap();
        assert_eq!(words, [7, 0x1122_3344_5566_7788]);

        let none = fetch_variadic_args(&memory, "plain", pointer).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn resolve_skips_null_and_missing() {
        let mut calls = Vec::new();
        let args = resolve_args("%s %s %d %s", &[0, 0x40, 3], StringWidth::Narrow, |address, _| {
            calls.push(address);
            Ok("text".to_string())
        })
        .unwrap();

        assert_eq!(calls, [0x40]);
        assert_eq!(
            args,
            [
                FormatArg::from("(null)"),
                FormatArg::from("text"),
                FormatArg::Int(3),
            ]
        );
    }

    #[test]
    fn sprintf_narrow_and_wide() {
        let mut memory = SandboxMemory::new(Bitness::Bit32, 4096);
        let name = memory.alloc_with_data(b"disk\0").unwrap();
        let buffer = memory.alloc(64).unwrap();

        let count = emulate_sprintf(
            &mut memory,
            buffer,
            "%s:%u",
            &[name, 3],
            StringWidth::Narrow,
            read_plain,
        )
        .unwrap();
        assert_eq!(count, 6);
        assert_eq!(memory.read(buffer, 7).unwrap(), b"disk:3\0");

        let wide_name = memory.alloc_with_data(&encode_string("\u{e9}t\u{e9}", StringWidth::Wide)).unwrap();
        let count = emulate_sprintf(
            &mut memory,
            buffer,
            "<%s>",
            &[wide_name],
            StringWidth::Wide,
            read_plain,
        )
        .unwrap();
        assert_eq!(count, 5);
        assert_eq!(
            memory.read(buffer, 12).unwrap(),
            [b'<', 0, 0xE9, 0, b't', 0, 0xE9, 0, b'>', 0, 0, 0]
        );
    }

    #[test]
    fn printf_without_conversions_is_a_copy() {
        let memory = SandboxMemory::new(Bitness::Bit64, 4096);
        let mut out = Vec::new();

        let count = emulate_printf(
            &memory,
            &mut out,
            "hello, world\n",
            &[],
            StringWidth::Narrow,
            read_plain,
        )
        .unwrap();
        assert_eq!(count, 13);
        assert_eq!(out, b"hello, world\n");
    }

    #[test]
    fn printf_counted_string() {
        let mut memory = SandboxMemory::new(Bitness::Bit32, 4096);
        let text = memory.alloc_with_data(b"\\Device\\Null").unwrap();
        let mut header = vec![12, 0, 12, 0];
        header.extend_from_slice(&u32::try_from(text).unwrap().to_le_bytes());
        let ansi = memory.alloc_with_data(&header).unwrap();

        let mut out = Vec::new();
        emulate_printf(
            &memory,
            &mut out,
            "open %Z\n",
            &[ansi],
            StringWidth::Narrow,
            read_plain,
        )
        .unwrap();
        assert_eq!(out, b"open \\Device\\Null\n");
    }
}
