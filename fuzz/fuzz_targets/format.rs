#![no_main]

use drvscope::emulation::{
    runtime::{argument_count, render, string_slots, FormatArg, StringWidth},
    Bitness,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Format text up to the first NUL, guest words after it.
    let split = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    let format = String::from_utf8_lossy(&data[..split]);
    let words = data.get(split + 1..).unwrap_or_default();

    let mut args: Vec<FormatArg> = words
        .chunks(8)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word[..chunk.len()].copy_from_slice(chunk);
            FormatArg::Int(u64::from_le_bytes(word))
        })
        .collect();
    let consumed = argument_count(&format);
    for slot in string_slots(&format, StringWidth::Narrow) {
        assert!(slot.index < consumed);
        if let Some(arg) = args.get_mut(slot.index) {
            *arg = FormatArg::Str(format!("s{}", slot.index));
        }
    }

    for bitness in [Bitness::Bit32, Bitness::Bit64] {
        let _ = render(&format, &args, bitness, StringWidth::Narrow);
    }
});
