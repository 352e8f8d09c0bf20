//! Windows kernel I/O manager constants.
//!
//! Major function codes, IOCTL transfer methods, device-object flags and `NTSTATUS` values,
//! with the numeric values of the native kernel ABI.

use std::fmt;

use bitflags::bitflags;
use strum::{Display, EnumCount, EnumIter};

/// `IRP_MJ_WRITE`
pub const IRP_MJ_WRITE: u8 = 0x04;
/// `IRP_MJ_DEVICE_CONTROL`
pub const IRP_MJ_DEVICE_CONTROL: u8 = 0x0E;
/// `IRP_MJ_MAXIMUM_FUNCTION`, the highest valid major function code.
pub const IRP_MJ_MAXIMUM_FUNCTION: u8 = 0x1B;

/// `IO_TYPE_IRP`, the `Type` tag of every IRP.
pub const IO_TYPE_IRP: u16 = 6;

/// `MDL_MAPPED_TO_SYSTEM_VA`
pub const MDL_MAPPED_TO_SYSTEM_VA: u16 = 0x0001;

/// Index into a driver's dispatch table.
///
/// `IRP_MJ_*` in the DDK headers. The discriminant is the native code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumIter, EnumCount)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum MajorFunction {
    #[strum(to_string = "IRP_MJ_CREATE")]
    Create = 0x00,
    #[strum(to_string = "IRP_MJ_CREATE_NAMED_PIPE")]
    CreateNamedPipe = 0x01,
    #[strum(to_string = "IRP_MJ_CLOSE")]
    Close = 0x02,
    #[strum(to_string = "IRP_MJ_READ")]
    Read = 0x03,
    #[strum(to_string = "IRP_MJ_WRITE")]
    Write = 0x04,
    #[strum(to_string = "IRP_MJ_QUERY_INFORMATION")]
    QueryInformation = 0x05,
    #[strum(to_string = "IRP_MJ_SET_INFORMATION")]
    SetInformation = 0x06,
    #[strum(to_string = "IRP_MJ_QUERY_EA")]
    QueryEa = 0x07,
    #[strum(to_string = "IRP_MJ_SET_EA")]
    SetEa = 0x08,
    #[strum(to_string = "IRP_MJ_FLUSH_BUFFERS")]
    FlushBuffers = 0x09,
    #[strum(to_string = "IRP_MJ_QUERY_VOLUME_INFORMATION")]
    QueryVolumeInformation = 0x0A,
    #[strum(to_string = "IRP_MJ_SET_VOLUME_INFORMATION")]
    SetVolumeInformation = 0x0B,
    #[strum(to_string = "IRP_MJ_DIRECTORY_CONTROL")]
    DirectoryControl = 0x0C,
    #[strum(to_string = "IRP_MJ_FILE_SYSTEM_CONTROL")]
    FileSystemControl = 0x0D,
    #[strum(to_string = "IRP_MJ_DEVICE_CONTROL")]
    DeviceControl = 0x0E,
    #[strum(to_string = "IRP_MJ_INTERNAL_DEVICE_CONTROL")]
    InternalDeviceControl = 0x0F,
    #[strum(to_string = "IRP_MJ_SHUTDOWN")]
    Shutdown = 0x10,
    #[strum(to_string = "IRP_MJ_LOCK_CONTROL")]
    LockControl = 0x11,
    #[strum(to_string = "IRP_MJ_CLEANUP")]
    Cleanup = 0x12,
    #[strum(to_string = "IRP_MJ_CREATE_MAILSLOT")]
    CreateMailslot = 0x13,
    #[strum(to_string = "IRP_MJ_QUERY_SECURITY")]
    QuerySecurity = 0x14,
    #[strum(to_string = "IRP_MJ_SET_SECURITY")]
    SetSecurity = 0x15,
    #[strum(to_string = "IRP_MJ_POWER")]
    Power = 0x16,
    #[strum(to_string = "IRP_MJ_SYSTEM_CONTROL")]
    SystemControl = 0x17,
    #[strum(to_string = "IRP_MJ_DEVICE_CHANGE")]
    DeviceChange = 0x18,
    #[strum(to_string = "IRP_MJ_QUERY_QUOTA")]
    QueryQuota = 0x19,
    #[strum(to_string = "IRP_MJ_SET_QUOTA")]
    SetQuota = 0x1A,
    #[strum(to_string = "IRP_MJ_PNP")]
    Pnp = 0x1B,
}

impl MajorFunction {
    /// Native major function code.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Position of this function in a driver's dispatch table.
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.code())
    }
}

impl TryFrom<u8> for MajorFunction {
    type Error = crate::Error;

    fn try_from(code: u8) -> crate::Result<Self> {
        use strum::IntoEnumIterator;

        MajorFunction::iter()
            .find(|function| function.code() == code)
            .ok_or_else(|| crate::emulation::EmulationError::InvalidMajorFunction { code }.into())
    }
}

/// Data transfer method of a device-control request, the low two bits of an IOCTL code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumIter)]
#[repr(u8)]
pub enum TransferMethod {
    /// `METHOD_BUFFERED`: input and output staged in one system buffer.
    #[strum(to_string = "METHOD_BUFFERED")]
    Buffered = 0,
    /// `METHOD_IN_DIRECT`: output described by an MDL, driver reads it.
    #[strum(to_string = "METHOD_IN_DIRECT")]
    InDirect = 1,
    /// `METHOD_OUT_DIRECT`: output described by an MDL, driver writes it.
    #[strum(to_string = "METHOD_OUT_DIRECT")]
    OutDirect = 2,
    /// `METHOD_NEITHER`: raw user addresses handed to the driver.
    #[strum(to_string = "METHOD_NEITHER")]
    Neither = 3,
}

impl TransferMethod {
    /// Extracts the method from the low two bits of `bits`.
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => TransferMethod::Buffered,
            1 => TransferMethod::InDirect,
            2 => TransferMethod::OutDirect,
            _ => TransferMethod::Neither,
        }
    }

    /// Native two-bit value.
    #[must_use]
    pub fn bits(self) -> u32 {
        u32::from(self as u8)
    }

    /// Returns `true` for the two MDL-based methods.
    #[must_use]
    pub fn is_direct(self) -> bool {
        matches!(self, TransferMethod::InDirect | TransferMethod::OutDirect)
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    /// `DEVICE_OBJECT.Flags`
    pub struct DeviceFlags : u32 {
        /// `DO_VERIFY_VOLUME`
        const VERIFY_VOLUME = 0x0000_0002;
        /// `DO_BUFFERED_IO`: writes are staged in a system buffer
        const BUFFERED_IO = 0x0000_0004;
        /// `DO_EXCLUSIVE`
        const EXCLUSIVE = 0x0000_0008;
        /// `DO_DIRECT_IO`: writes are described by an MDL
        const DIRECT_IO = 0x0000_0010;
        /// `DO_MAP_IO_BUFFER`
        const MAP_IO_BUFFER = 0x0000_0020;
        /// `DO_DEVICE_INITIALIZING`
        const DEVICE_INITIALIZING = 0x0000_0080;
        /// `DO_POWER_PAGABLE`
        const POWER_PAGABLE = 0x0000_2000;
    }
}

/// How a device stages the payload of read and write requests.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum IoBuffering {
    /// Payload copied into a system buffer.
    Buffered,
    /// Payload described by an MDL.
    Direct,
    /// Raw user buffer handed to the driver.
    Neither,
}

impl From<DeviceFlags> for IoBuffering {
    /// Buffered I/O takes precedence over direct I/O; a device with neither flag uses
    /// neither I/O.
    fn from(flags: DeviceFlags) -> Self {
        if flags.contains(DeviceFlags::BUFFERED_IO) {
            IoBuffering::Buffered
        } else if flags.contains(DeviceFlags::DIRECT_IO) {
            IoBuffering::Direct
        } else {
            IoBuffering::Neither
        }
    }
}

/// An `NTSTATUS` value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct NtStatus(pub i32);

#[allow(clippy::cast_possible_wrap)] // NTSTATUS error codes are defined as u32 literals
impl NtStatus {
    /// `STATUS_SUCCESS`
    pub const SUCCESS: NtStatus = NtStatus(0);
    /// `STATUS_PENDING`
    pub const PENDING: NtStatus = NtStatus(0x0000_0103);
    /// `STATUS_UNSUCCESSFUL`
    pub const UNSUCCESSFUL: NtStatus = NtStatus(0xC000_0001_u32 as i32);
    /// `STATUS_INVALID_PARAMETER`
    pub const INVALID_PARAMETER: NtStatus = NtStatus(0xC000_000D_u32 as i32);
    /// `STATUS_INVALID_DEVICE_REQUEST`
    pub const INVALID_DEVICE_REQUEST: NtStatus = NtStatus(0xC000_0010_u32 as i32);
    /// `STATUS_BUFFER_TOO_SMALL`
    pub const BUFFER_TOO_SMALL: NtStatus = NtStatus(0xC000_0023_u32 as i32);
    /// `STATUS_NOT_SUPPORTED`
    pub const NOT_SUPPORTED: NtStatus = NtStatus(0xC000_00BB_u32 as i32);

    /// `NT_SUCCESS(status)`: success and informational codes are non-negative.
    #[must_use]
    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// The status as the unsigned value found in guest memory.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn as_u32(self) -> u32 {
        self.0 as u32
    }
}

impl From<u32> for NtStatus {
    #[allow(clippy::cast_possible_wrap)]
    fn from(raw: u32) -> Self {
        NtStatus(raw as i32)
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u32())
    }
}
