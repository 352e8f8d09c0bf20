//! `printf`-style formatting with guest semantics.
//!
//! Guest code hands a format string and a list of machine words to `printf`, `sprintf`,
//! `DbgPrint` and friends. This module parses the format with C rules and renders it against
//! a list of [`FormatArg`]s, where every string conversion has already been resolved to its
//! text (see [`string_slots`]).
//!
//! # Supported syntax
//!
//! `%[flags][width][.precision][length]conversion` with:
//!
//! - flags `-`, `+`, space, `#`, `0`
//! - width and precision as digits or `*`
//! - length modifiers `hh`, `h`, `l`, `ll`, `L`, `j`, `z`, `t`, `I`, `I32`, `I64`, `w`
//! - conversions `d i u o x X c C s S Z e E f F g G p n %`
//!
//! Anything else is copied to the output unchanged.
//!
//! # Argument model
//!
//! Every argument is one guest word. `h` and `hh` truncate to 16 and 8 bits. Signed
//! conversions sign-extend from 32 bits unless a 64-bit modifier is present (`ll`, `I64`,
//! `j`, `L`; `z`, `t` and `I` follow the guest word size). Unsigned conversions print the full
//! word. Floating-point conversions reinterpret the word's bits as an IEEE-754 double. `%p` is
//! rendered as `%#x` and `%llx` as `%x`.
//!
//! # Example
//!
//! ```rust
//! use drvscope::emulation::{
//!     runtime::{format::render, FormatArg, StringWidth},
//!     Bitness,
//! };
//!
//! let args = [FormatArg::from("x"), FormatArg::Int(5)];
//! let text = render("%s=%03d", &args, Bitness::Bit32, StringWidth::Narrow)?;
//! assert_eq!(text, "x=005");
//! # Ok::<(), drvscope::Error>(())
//! ```

use std::fmt;

use crate::{
    emulation::{engine::EmulationError, memory::Bitness, runtime::text::StringWidth},
    Result,
};

/// One resolved variadic argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormatArg {
    /// A raw guest word.
    Int(u64),
    /// The text behind a string conversion's pointer.
    Str(String),
}

impl FormatArg {
    fn as_word(&self) -> u64 {
        match self {
            FormatArg::Int(value) => *value,
            FormatArg::Str(_) => 0,
        }
    }
}

impl From<u64> for FormatArg {
    fn from(value: u64) -> Self {
        FormatArg::Int(value)
    }
}

impl From<&str> for FormatArg {
    fn from(value: &str) -> Self {
        FormatArg::Str(value.to_string())
    }
}

impl From<String> for FormatArg {
    fn from(value: String) -> Self {
        FormatArg::Str(value)
    }
}

impl fmt::Display for FormatArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatArg::Int(value) => write!(f, "{value:#x}"),
            FormatArg::Str(text) => write!(f, "{text}"),
        }
    }
}

/// A string conversion and the argument it consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StringSlot {
    /// Zero-based index into the argument list.
    pub index: usize,
    /// Character width of the pointed-to text.
    pub width: StringWidth,
    /// `true` for `%Z`/`%wZ`, whose argument points to an `ANSI_STRING`/`UNICODE_STRING`.
    pub counted: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Flags {
    left: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Count {
    Fixed(usize),
    Next,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Length {
    Default,
    Char,
    Short,
    Long,
    LongLong,
    LongDouble,
    IntMax,
    Size,
    PtrDiff,
    Ptr,
    Int32,
    Int64,
    Wide,
}

impl Length {
    const MODIFIERS: [(&'static str, Length); 12] = [
        ("hh", Length::Char),
        ("h", Length::Short),
        ("ll", Length::LongLong),
        ("l", Length::Long),
        ("L", Length::LongDouble),
        ("j", Length::IntMax),
        ("z", Length::Size),
        ("t", Length::PtrDiff),
        ("I64", Length::Int64),
        ("I32", Length::Int32),
        ("I", Length::Ptr),
        ("w", Length::Wide),
    ];

    /// Number of significant bits for a signed conversion.
    fn signed_bits(self, bitness: Bitness) -> u32 {
        match self {
            Length::Char => 8,
            Length::Short => 16,
            Length::LongLong | Length::LongDouble | Length::IntMax | Length::Int64 => 64,
            Length::Size | Length::PtrDiff | Length::Ptr => bitness.bits(),
            Length::Default | Length::Long | Length::Int32 | Length::Wide => 32,
        }
    }

    /// Explicit character width requested by the modifier, if any.
    fn char_width(self) -> Option<StringWidth> {
        match self {
            Length::Char | Length::Short => Some(StringWidth::Narrow),
            Length::Long | Length::Wide => Some(StringWidth::Wide),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Spec {
    flags: Flags,
    width: Option<Count>,
    precision: Option<Count>,
    length: Length,
    conversion: char,
}

impl Spec {
    fn consumes_argument(&self) -> bool {
        self.conversion != '%'
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Conversion(Spec),
}

const CONVERSIONS: &str = "diouxXcCsSZeEfFgGpn";

/// Upper bound on widths and precisions, so a hostile format cannot exhaust host memory.
const MAX_COUNT: usize = 0x10000;

fn parse(format: &str) -> Vec<Segment<'_>> {
    let bytes = format.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }

        if literal_start < i {
            segments.push(Segment::Literal(&format[literal_start..i]));
        }
        let start = i;
        i += 1;

        let mut flags = Flags::default();
        while let Some(&flag) = bytes.get(i) {
            match flag {
                b'-' => flags.left = true,
                b'+' => flags.plus = true,
                b' ' => flags.space = true,
                b'#' => flags.alt = true,
                b'0' => flags.zero = true,
                _ => break,
            }
            i += 1;
        }

        let width = parse_count(bytes, &mut i);
        let precision = if bytes.get(i) == Some(&b'.') {
            i += 1;
            Some(parse_count(bytes, &mut i).unwrap_or(Count::Fixed(0)))
        } else {
            None
        };

        let mut length = Length::Default;
        for (modifier, candidate) in Length::MODIFIERS {
            if format[i..].starts_with(modifier) {
                length = candidate;
                i += modifier.len();
                break;
            }
        }

        match format[i..].chars().next() {
            Some(conversion) if conversion == '%' || CONVERSIONS.contains(conversion) => {
                i += 1;
                segments.push(Segment::Conversion(Spec {
                    flags,
                    width,
                    precision,
                    length,
                    conversion,
                }));
            }
            Some(other) => {
                i += other.len_utf8();
                segments.push(Segment::Literal(&format[start..i]));
            }
            None => segments.push(Segment::Literal(&format[start..])),
        }

        literal_start = i;
    }

    if literal_start < bytes.len() {
        segments.push(Segment::Literal(&format[literal_start..]));
    }

    segments
}

fn parse_count(bytes: &[u8], i: &mut usize) -> Option<Count> {
    if bytes.get(*i) == Some(&b'*') {
        *i += 1;
        return Some(Count::Next);
    }

    let start = *i;
    let mut value: usize = 0;
    while let Some(digit) = bytes.get(*i).filter(|b| b.is_ascii_digit()) {
        value = value.saturating_mul(10).saturating_add(usize::from(digit - b'0'));
        *i += 1;
    }

    (*i > start).then_some(Count::Fixed(value.min(MAX_COUNT)))
}

/// Lists the string conversions of `format` with the index of the argument each consumes.
///
/// `default` is the width of a plain `%s`: narrow for `printf`, wide for `wprintf`. `%S`
/// selects the opposite width, `h` forces narrow and `l`/`w` force wide.
#[must_use]
pub fn string_slots(format: &str, default: StringWidth) -> Vec<StringSlot> {
    let mut slots = Vec::new();
    let mut index = 0;

    for segment in parse(format) {
        let Segment::Conversion(spec) = segment else {
            continue;
        };

        index += usize::from(spec.width == Some(Count::Next));
        index += usize::from(spec.precision == Some(Count::Next));
        if !spec.consumes_argument() {
            continue;
        }

        let slot = match spec.conversion {
            's' => Some((spec.length.char_width().unwrap_or(default), false)),
            'S' => Some((spec.length.char_width().unwrap_or(default.opposite()), false)),
            'Z' => Some((
                spec.length.char_width().unwrap_or(StringWidth::Narrow),
                true,
            )),
            _ => None,
        };

        if let Some((width, counted)) = slot {
            slots.push(StringSlot {
                index,
                width,
                counted,
            });
        }
        index += 1;
    }

    slots
}

/// Number of arguments `format` consumes, counting `*` widths and precisions.
#[must_use]
pub fn argument_count(format: &str) -> usize {
    parse(format)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Conversion(spec) => Some(
                usize::from(spec.width == Some(Count::Next))
                    + usize::from(spec.precision == Some(Count::Next))
                    + usize::from(spec.consumes_argument()),
            ),
            Segment::Literal(_) => None,
        })
        .sum()
}

struct Arguments<'a> {
    args: &'a [FormatArg],
    next: usize,
}

impl<'a> Arguments<'a> {
    fn next(&mut self) -> Result<&'a FormatArg> {
        let index = self.next;
        let arg = self
            .args
            .get(index)
            .ok_or(EmulationError::FormatArgumentMissing { index })?;
        self.next += 1;
        Ok(arg)
    }

    /// Resolves a `*` count; a negative width left-justifies, a negative precision is ignored.
    #[allow(clippy::cast_possible_truncation)] // `*` arguments are C ints
    fn count(&mut self, count: Option<Count>, flags: &mut Flags, is_width: bool) -> Result<Option<usize>> {
        match count {
            None => Ok(None),
            Some(Count::Fixed(value)) => Ok(Some(value)),
            Some(Count::Next) => {
                let value = self.next()?.as_word() as u32 as i32;
                let magnitude = (value.unsigned_abs() as usize).min(MAX_COUNT);
                if value >= 0 {
                    Ok(Some(magnitude))
                } else if is_width {
                    flags.left = true;
                    Ok(Some(magnitude))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

/// Renders `format` against already-resolved arguments.
///
/// `width` is the default character width of `%s` and `%c`. String conversions whose
/// argument is still a raw word render the word as an address, or `(null)` for zero.
///
/// # Errors
///
/// Returns [`EmulationError::FormatArgumentMissing`] if the format consumes more
/// arguments than provided.
pub fn render(
    format: &str,
    args: &[FormatArg],
    bitness: Bitness,
    width: StringWidth,
) -> Result<String> {
    let mut out = String::with_capacity(format.len());
    let mut args = Arguments { args, next: 0 };

    for segment in parse(format) {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Conversion(spec) => render_conversion(&mut out, spec, &mut args, bitness, width)?,
        }
    }

    Ok(out)
}

fn render_conversion(
    out: &mut String,
    spec: Spec,
    args: &mut Arguments<'_>,
    bitness: Bitness,
    default_width: StringWidth,
) -> Result<()> {
    let mut flags = spec.flags;
    let width = args.count(spec.width, &mut flags, true)?;
    let precision = args.count(spec.precision, &mut flags, false)?;

    match spec.conversion {
        '%' => out.push('%'),
        'n' => {
            args.next()?;
        }
        'd' | 'i' | 'u' | 'o' | 'x' | 'X' | 'p' => {
            let value = args.next()?.as_word();
            let number = integer(spec, flags, precision, value, bitness);
            pad_number(out, &number, flags, width, precision.is_none());
        }
        'e' | 'E' | 'f' | 'F' | 'g' | 'G' => {
            let value = f64::from_bits(args.next()?.as_word());
            let number = float(spec.conversion, flags, precision, value);
            pad_number(out, &number, flags, width, value.is_finite());
        }
        'c' | 'C' => {
            let value = args.next()?.as_word();
            let char_width = spec.length.char_width().unwrap_or(if spec.conversion == 'C' {
                default_width.opposite()
            } else {
                default_width
            });
            let text = character(value, char_width).to_string();
            pad_text(out, &text, flags, width);
        }
        _ => {
            let text = match args.next()? {
                FormatArg::Str(text) => match precision {
                    Some(limit) => text.chars().take(limit).collect(),
                    None => text.clone(),
                },
                FormatArg::Int(0) => "(null)".to_string(),
                FormatArg::Int(address) => format!("{address:#x}"),
            };
            pad_text(out, &text, flags, width);
        }
    }

    Ok(())
}

/// A rendered number, split so that zero padding lands between prefix and digits.
struct Number {
    sign: &'static str,
    prefix: &'static str,
    digits: String,
}

fn integer(spec: Spec, flags: Flags, precision: Option<usize>, value: u64, bitness: Bitness) -> Number {
    let conversion = spec.conversion;
    let mut sign = "";

    let magnitude = match conversion {
        'd' | 'i' => {
            let shift = 64 - spec.length.signed_bits(bitness);
            #[allow(clippy::cast_possible_wrap)]
            let signed = ((value << shift) as i64) >> shift;
            if signed < 0 {
                sign = "-";
            } else if flags.plus {
                sign = "+";
            } else if flags.space {
                sign = " ";
            }
            signed.unsigned_abs()
        }
        'p' => value,
        _ => match spec.length {
            Length::Char => value & 0xFF,
            Length::Short => value & 0xFFFF,
            _ => value,
        },
    };

    let mut digits = match conversion {
        'o' => format!("{magnitude:o}"),
        'x' | 'p' => format!("{magnitude:x}"),
        'X' => format!("{magnitude:X}"),
        _ => magnitude.to_string(),
    };

    if let Some(precision) = precision {
        if precision == 0 && magnitude == 0 {
            digits.clear();
        } else if digits.len() < precision {
            digits.insert_str(0, &"0".repeat(precision - digits.len()));
        }
    }

    let prefix = match conversion {
        'p' => "0x",
        'x' if flags.alt && magnitude != 0 => "0x",
        'X' if flags.alt && magnitude != 0 => "0X",
        'o' if flags.alt && !digits.starts_with('0') => "0",
        _ => "",
    };

    Number {
        sign,
        prefix,
        digits,
    }
}

fn float(conversion: char, flags: Flags, precision: Option<usize>, value: f64) -> Number {
    let upper = conversion.is_ascii_uppercase();
    let sign = if value.is_sign_negative() && !value.is_nan() {
        "-"
    } else if flags.plus {
        "+"
    } else if flags.space {
        " "
    } else {
        ""
    };

    let digits = if value.is_finite() {
        let magnitude = value.abs();
        let precision = precision.unwrap_or(6);
        match conversion.to_ascii_lowercase() {
            'f' => {
                let mut text = format!("{magnitude:.precision$}");
                if flags.alt && precision == 0 {
                    text.push('.');
                }
                text
            }
            'e' => exponential(magnitude, precision, upper, flags.alt),
            _ => general(magnitude, precision, upper, flags.alt),
        }
    } else {
        let text = if value.is_nan() { "nan" } else { "inf" };
        if upper {
            text.to_ascii_uppercase()
        } else {
            text.to_string()
        }
    };

    Number {
        sign,
        prefix: "",
        digits,
    }
}

/// `%e`: one digit, `precision` decimals, and an exponent of at least two digits.
fn exponential(value: f64, precision: usize, upper: bool, alt: bool) -> String {
    let text = format!("{value:.precision$e}");
    let (mantissa, exponent) = text.split_once('e').unwrap_or((text.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    let mut out = mantissa.to_string();
    if alt && precision == 0 {
        out.push('.');
    }
    out.push(if upper { 'E' } else { 'e' });
    out.push(if exponent < 0 { '-' } else { '+' });
    out.push_str(&format!("{:02}", exponent.unsigned_abs()));
    out
}

/// `%g`: `%e` or `%f` depending on the exponent, trailing zeros removed unless `#`.
fn general(value: f64, precision: usize, upper: bool, alt: bool) -> String {
    let precision = precision.max(1);
    let exponent = if value == 0.0 {
        0
    } else {
        let decimals = precision - 1;
        let probe = format!("{value:.decimals$e}");
        probe
            .split_once('e')
            .and_then(|(_, exponent)| exponent.parse::<i64>().ok())
            .unwrap_or(0)
    };

    let significant = i64::try_from(precision).unwrap_or(i64::MAX);
    let text = if exponent >= -4 && exponent < significant {
        let decimals = usize::try_from(significant - 1 - exponent).unwrap_or(0);
        format!("{value:.decimals$}")
    } else {
        exponential(value, precision - 1, upper, false)
    };

    if alt {
        return text;
    }

    match text.find(['e', 'E']) {
        Some(split) => {
            let (mantissa, exponent) = text.split_at(split);
            format!("{}{exponent}", trim_fraction(mantissa))
        }
        None => trim_fraction(&text).to_string(),
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

#[allow(clippy::cast_possible_truncation)] // Masked to the character width first
fn character(value: u64, width: StringWidth) -> char {
    match width {
        StringWidth::Narrow => char::from((value & 0xFF) as u8),
        StringWidth::Wide => {
            char::from_u32((value & 0xFFFF) as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
        }
    }
}

fn pad_number(out: &mut String, number: &Number, flags: Flags, width: Option<usize>, zero_allowed: bool) {
    let body_len = number.sign.len() + number.prefix.len() + number.digits.chars().count();
    let fill = width.unwrap_or(0).saturating_sub(body_len);

    if flags.left {
        out.push_str(number.sign);
        out.push_str(number.prefix);
        out.push_str(&number.digits);
        out.extend(std::iter::repeat(' ').take(fill));
    } else if flags.zero && zero_allowed {
        out.push_str(number.sign);
        out.push_str(number.prefix);
        out.extend(std::iter::repeat('0').take(fill));
        out.push_str(&number.digits);
    } else {
        out.extend(std::iter::repeat(' ').take(fill));
        out.push_str(number.sign);
        out.push_str(number.prefix);
        out.push_str(&number.digits);
    }
}

fn pad_text(out: &mut String, text: &str, flags: Flags, width: Option<usize>) {
    let fill = width.unwrap_or(0).saturating_sub(text.chars().count());

    if flags.left {
        out.push_str(text);
        out.extend(std::iter::repeat(' ').take(fill));
    } else {
        out.extend(std::iter::repeat(' ').take(fill));
        out.push_str(text);
    }
}
