//! IOCTL control codes.
//!
//! A device-control code packs four fields into 32 bits, exactly like the `CTL_CODE` macro:
//!
//! ```text
//!  31            16 15  14 13               2 1    0
//! +----------------+------+-------------------+------+
//! |  device type   |access|     function      |method|
//! +----------------+------+-------------------+------+
//! ```

use std::fmt;

use crate::emulation::kernel::constants::TransferMethod;

/// Packs an IOCTL code: `(device_type << 16) | (access << 14) | (function << 2) | method`.
///
/// Fields are not masked; callers passing out-of-range values get the bits they asked for.
#[must_use]
pub fn ioctl_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

/// A decoded IOCTL control code.
///
/// # Example
///
/// ```rust
/// use drvscope::emulation::kernel::{IoctlCode, TransferMethod};
///
/// let code = IoctlCode::new(0x22, 0x800, TransferMethod::Neither, 0);
/// assert_eq!(code.raw(), 0x0022_2003);
/// assert_eq!(IoctlCode::from(0x0022_2003), code);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct IoctlCode {
    device_type: u16,
    function: u16,
    method: TransferMethod,
    access: u8,
}

impl IoctlCode {
    /// Creates a control code from its fields.
    ///
    /// `function` keeps its low 12 bits and `access` its low 2 bits.
    #[must_use]
    pub fn new(device_type: u16, function: u16, method: TransferMethod, access: u8) -> Self {
        IoctlCode {
            device_type,
            function: function & 0x0FFF,
            method,
            access: access & 0b11,
        }
    }

    /// The packed 32-bit value.
    #[must_use]
    pub fn raw(&self) -> u32 {
        ioctl_code(
            u32::from(self.device_type),
            u32::from(self.function),
            self.method.bits(),
            u32::from(self.access),
        )
    }

    /// `DeviceType` field.
    #[must_use]
    pub fn device_type(&self) -> u16 {
        self.device_type
    }

    /// `Function` field.
    #[must_use]
    pub fn function(&self) -> u16 {
        self.function
    }

    /// Transfer method, which selects the buffering of the request.
    #[must_use]
    pub fn method(&self) -> TransferMethod {
        self.method
    }

    /// `RequiredAccess` field.
    #[must_use]
    pub fn access(&self) -> u8 {
        self.access
    }
}

impl From<u32> for IoctlCode {
    #[allow(clippy::cast_possible_truncation)] // Fields are masked before narrowing
    fn from(raw: u32) -> Self {
        IoctlCode {
            device_type: (raw >> 16) as u16,
            function: ((raw >> 2) & 0x0FFF) as u16,
            method: TransferMethod::from_bits(raw),
            access: ((raw >> 14) & 0b11) as u8,
        }
    }
}

impl From<IoctlCode> for u32 {
    fn from(code: IoctlCode) -> Self {
        code.raw()
    }
}

impl fmt::Display for IoctlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X} ({})", self.raw(), self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn method_survives_packing() {
        for method in 0..4 {
            for (device_type, function, access) in [(0, 0, 0), (0x22, 0x800, 3), (0xFFFF, 0xFFF, 1)]
            {
                let code = ioctl_code(device_type, function, method, access);
                assert_eq!(code & 3, method);
            }
        }
    }

    #[test]
    fn known_codes() {
        // IOCTL_DISK_GET_DRIVE_GEOMETRY
        assert_eq!(ioctl_code(0x07, 0x000, 0, 0), 0x0007_0000);
        // FSCTL_GET_REPARSE_POINT
        assert_eq!(ioctl_code(0x09, 42, 0, 0), 0x0009_00A8);
        // IOCTL_STORAGE_QUERY_PROPERTY
        assert_eq!(ioctl_code(0x2D, 0x500, 0, 0), 0x002D_1400);
    }

    #[test]
    fn decode_fields() {
        for method in TransferMethod::iter() {
            let code = IoctlCode::new(0x8000, 0x901, method, 2);
            let decoded = IoctlCode::from(code.raw());

            assert_eq!(decoded, code);
            assert_eq!(decoded.device_type(), 0x8000);
            assert_eq!(decoded.function(), 0x901);
            assert_eq!(decoded.access(), 2);
            assert_eq!(decoded.method(), method);
        }
    }

    #[test]
    fn display_shows_method() {
        let code = IoctlCode::new(0x22, 0x800, TransferMethod::Buffered, 0);
        assert_eq!(code.to_string(), "0x00222000 (METHOD_BUFFERED)");
    }
}
