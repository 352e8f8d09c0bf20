//! Guest-resident kernel structures.
//!
//! Each structure exists in two bit-exact native layouts, one per [`Bitness`]. The layouts
//! are kept as static offset tables; [`KernelStruct`] encodes and decodes a structure with
//! the table matching the guest, so a field can never be accessed with the wrong layout.
//!
//! Only the fields the I/O manager emulation reads or writes are modelled. Everything else
//! is encoded as zero, which is what a freshly allocated packet holds.
//!
//! | Structure | 32-bit size | 64-bit size |
//! |-----------|-------------|-------------|
//! | `IRP` | `0x70` | `0xD0` |
//! | `IO_STACK_LOCATION` | `0x24` | `0x48` |
//! | `MDL` | `0x1C` | `0x30` |
//! | `DEVICE_OBJECT` | `0xB8` | `0x150` |

use crate::{
    emulation::{
        kernel::constants::{
            DeviceFlags, MajorFunction, NtStatus, IO_TYPE_IRP, IRP_MJ_DEVICE_CONTROL,
            IRP_MJ_WRITE, MDL_MAPPED_TO_SYSTEM_VA,
        },
        memory::{Bitness, GuestMemory},
    },
    utils::io::{read_le_from, read_ptr_from, write_le_into, write_ptr_into},
    Result,
};

/// A kernel structure with one native layout per guest word size.
pub trait KernelStruct: Sized {
    /// Size of the native structure in bytes.
    fn size_of(bitness: Bitness) -> usize;

    /// Encodes the structure into its native byte representation.
    ///
    /// # Errors
    ///
    /// Returns an error if a pointer does not fit the guest's pointer width.
    fn encode(&self, bitness: Bitness) -> Result<Vec<u8>>;

    /// Decodes the structure from its native byte representation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than the structure.
    fn decode(data: &[u8], bitness: Bitness) -> Result<Self>;

    /// Reads and decodes the structure at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory cannot be read or decoded.
    fn read_from<M: GuestMemory + ?Sized>(memory: &M, address: u64) -> Result<Self> {
        let bitness = memory.bitness();
        let data = memory.read(address, Self::size_of(bitness))?;
        Self::decode(&data, bitness)
    }

    /// Encodes the structure and writes it at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the structure cannot be encoded or the memory written.
    fn write_to<M: GuestMemory + ?Sized>(&self, memory: &mut M, address: u64) -> Result<()> {
        let data = self.encode(memory.bitness())?;
        memory.write(address, &data)
    }
}

struct IrpLayout {
    size: usize,
    mdl_address: usize,
    flags: usize,
    system_buffer: usize,
    status: usize,
    information: usize,
    stack_count: usize,
    current_location: usize,
    user_buffer: usize,
    current_stack_location: usize,
}

static IRP_32: IrpLayout = IrpLayout {
    size: 0x70,
    mdl_address: 0x04,
    flags: 0x08,
    system_buffer: 0x0C,
    status: 0x18,
    information: 0x1C,
    stack_count: 0x22,
    current_location: 0x23,
    user_buffer: 0x3C,
    current_stack_location: 0x60,
};

static IRP_64: IrpLayout = IrpLayout {
    size: 0xD0,
    mdl_address: 0x08,
    flags: 0x10,
    system_buffer: 0x18,
    status: 0x30,
    information: 0x38,
    stack_count: 0x42,
    current_location: 0x43,
    user_buffer: 0x70,
    current_stack_location: 0xB8,
};

impl IrpLayout {
    fn for_bitness(bitness: Bitness) -> &'static IrpLayout {
        match bitness {
            Bitness::Bit32 => &IRP_32,
            Bitness::Bit64 => &IRP_64,
        }
    }
}

/// `IO_STATUS_BLOCK`, the completion result of a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IoStatusBlock {
    /// Completion status set by the driver.
    pub status: NtStatus,
    /// Request-dependent information, usually the number of bytes transferred.
    pub information: u64,
}

/// `IRP`, one in-flight I/O request.
///
/// `Type` and `Size` are derived from the layout when encoding; `Tail.Overlay` is reduced
/// to the current stack location pointer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Irp {
    /// `MdlAddress`
    pub mdl_address: u64,
    /// `Flags`
    pub flags: u32,
    /// `AssociatedIrp.SystemBuffer`
    pub system_buffer: u64,
    /// `IoStatus`
    pub io_status: IoStatusBlock,
    /// `StackCount`
    pub stack_count: u8,
    /// `CurrentLocation`
    pub current_location: u8,
    /// `UserBuffer`
    pub user_buffer: u64,
    /// `Tail.Overlay.CurrentStackLocation`
    pub current_stack_location: u64,
}

impl KernelStruct for Irp {
    fn size_of(bitness: Bitness) -> usize {
        IrpLayout::for_bitness(bitness).size
    }

    fn encode(&self, bitness: Bitness) -> Result<Vec<u8>> {
        let layout = IrpLayout::for_bitness(bitness);
        let mut data = vec![0u8; layout.size];

        write_le_into(&mut data, 0x00, IO_TYPE_IRP)?;
        write_le_into(&mut data, 0x02, packed_size(layout.size)?)?;
        write_ptr_into(&mut data, layout.mdl_address, self.mdl_address, bitness)?;
        write_le_into(&mut data, layout.flags, self.flags)?;
        write_ptr_into(&mut data, layout.system_buffer, self.system_buffer, bitness)?;
        write_le_into(&mut data, layout.status, self.io_status.status.0)?;
        write_ptr_into(
            &mut data,
            layout.information,
            self.io_status.information,
            bitness,
        )?;
        write_le_into(&mut data, layout.stack_count, self.stack_count)?;
        write_le_into(&mut data, layout.current_location, self.current_location)?;
        write_ptr_into(&mut data, layout.user_buffer, self.user_buffer, bitness)?;
        write_ptr_into(
            &mut data,
            layout.current_stack_location,
            self.current_stack_location,
            bitness,
        )?;

        Ok(data)
    }

    fn decode(data: &[u8], bitness: Bitness) -> Result<Self> {
        let layout = IrpLayout::for_bitness(bitness);

        Ok(Irp {
            mdl_address: read_ptr_from(data, layout.mdl_address, bitness)?,
            flags: read_le_from(data, layout.flags)?,
            system_buffer: read_ptr_from(data, layout.system_buffer, bitness)?,
            io_status: IoStatusBlock {
                status: NtStatus(read_le_from(data, layout.status)?),
                information: read_ptr_from(data, layout.information, bitness)?,
            },
            stack_count: read_le_from(data, layout.stack_count)?,
            current_location: read_le_from(data, layout.current_location)?,
            user_buffer: read_ptr_from(data, layout.user_buffer, bitness)?,
            current_stack_location: read_ptr_from(data, layout.current_stack_location, bitness)?,
        })
    }
}

struct StackLayout {
    size: usize,
    write_length: usize,
    write_key: usize,
    write_byte_offset: usize,
    output_buffer_length: usize,
    input_buffer_length: usize,
    io_control_code: usize,
    type3_input_buffer: usize,
    device_object: usize,
    file_object: usize,
}

static STACK_32: StackLayout = StackLayout {
    size: 0x24,
    write_length: 0x04,
    write_key: 0x08,
    write_byte_offset: 0x0C,
    output_buffer_length: 0x04,
    input_buffer_length: 0x08,
    io_control_code: 0x0C,
    type3_input_buffer: 0x10,
    device_object: 0x14,
    file_object: 0x18,
};

static STACK_64: StackLayout = StackLayout {
    size: 0x48,
    write_length: 0x08,
    write_key: 0x10,
    write_byte_offset: 0x18,
    output_buffer_length: 0x08,
    input_buffer_length: 0x10,
    io_control_code: 0x18,
    type3_input_buffer: 0x20,
    device_object: 0x28,
    file_object: 0x30,
};

impl StackLayout {
    fn for_bitness(bitness: Bitness) -> &'static StackLayout {
        match bitness {
            Bitness::Bit32 => &STACK_32,
            Bitness::Bit64 => &STACK_64,
        }
    }
}

/// The `Parameters` union of an I/O stack location, interpreted by major function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StackParameters {
    /// Parameters of a major function this crate does not model.
    #[default]
    None,
    /// `Parameters.Write`
    Write {
        /// Number of bytes to write.
        length: u32,
        /// Byte-range lock key.
        key: u32,
        /// Starting byte offset in the file.
        byte_offset: i64,
    },
    /// `Parameters.DeviceIoControl`
    DeviceIoControl {
        /// Size of the caller's output buffer.
        output_buffer_length: u32,
        /// Size of the caller's input buffer.
        input_buffer_length: u32,
        /// The IOCTL code.
        io_control_code: u32,
        /// Caller's input buffer address, used by `METHOD_NEITHER`.
        type3_input_buffer: u64,
    },
}

/// `IO_STACK_LOCATION`, the per-driver parameters of a request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IoStackLocation {
    /// `MajorFunction`
    pub major_function: u8,
    /// `MinorFunction`
    pub minor_function: u8,
    /// `Flags`
    pub flags: u8,
    /// `Control`
    pub control: u8,
    /// `Parameters`
    pub parameters: StackParameters,
    /// `DeviceObject`
    pub device_object: u64,
    /// `FileObject`
    pub file_object: u64,
}

impl IoStackLocation {
    /// A stack location for `function` with the given parameters.
    #[must_use]
    pub fn new(function: MajorFunction, parameters: StackParameters, device_object: u64) -> Self {
        IoStackLocation {
            major_function: function.code(),
            parameters,
            device_object,
            ..Default::default()
        }
    }
}

impl KernelStruct for IoStackLocation {
    fn size_of(bitness: Bitness) -> usize {
        StackLayout::for_bitness(bitness).size
    }

    fn encode(&self, bitness: Bitness) -> Result<Vec<u8>> {
        let layout = StackLayout::for_bitness(bitness);
        let mut data = vec![0u8; layout.size];

        data[0] = self.major_function;
        data[1] = self.minor_function;
        data[2] = self.flags;
        data[3] = self.control;

        match self.parameters {
            StackParameters::None => {}
            StackParameters::Write {
                length,
                key,
                byte_offset,
            } => {
                write_le_into(&mut data, layout.write_length, length)?;
                write_le_into(&mut data, layout.write_key, key)?;
                write_le_into(&mut data, layout.write_byte_offset, byte_offset)?;
            }
            StackParameters::DeviceIoControl {
                output_buffer_length,
                input_buffer_length,
                io_control_code,
                type3_input_buffer,
            } => {
                write_le_into(&mut data, layout.output_buffer_length, output_buffer_length)?;
                write_le_into(&mut data, layout.input_buffer_length, input_buffer_length)?;
                write_le_into(&mut data, layout.io_control_code, io_control_code)?;
                write_ptr_into(&mut data, layout.type3_input_buffer, type3_input_buffer, bitness)?;
            }
        }

        write_ptr_into(&mut data, layout.device_object, self.device_object, bitness)?;
        write_ptr_into(&mut data, layout.file_object, self.file_object, bitness)?;

        Ok(data)
    }

    fn decode(data: &[u8], bitness: Bitness) -> Result<Self> {
        let layout = StackLayout::for_bitness(bitness);
        let major_function: u8 = read_le_from(data, 0)?;

        let parameters = match major_function {
            IRP_MJ_WRITE => StackParameters::Write {
                length: read_le_from(data, layout.write_length)?,
                key: read_le_from(data, layout.write_key)?,
                byte_offset: read_le_from(data, layout.write_byte_offset)?,
            },
            IRP_MJ_DEVICE_CONTROL => StackParameters::DeviceIoControl {
                output_buffer_length: read_le_from(data, layout.output_buffer_length)?,
                input_buffer_length: read_le_from(data, layout.input_buffer_length)?,
                io_control_code: read_le_from(data, layout.io_control_code)?,
                type3_input_buffer: read_ptr_from(data, layout.type3_input_buffer, bitness)?,
            },
            _ => StackParameters::None,
        };

        Ok(IoStackLocation {
            major_function,
            minor_function: read_le_from(data, 1)?,
            flags: read_le_from(data, 2)?,
            control: read_le_from(data, 3)?,
            parameters,
            device_object: read_ptr_from(data, layout.device_object, bitness)?,
            file_object: read_ptr_from(data, layout.file_object, bitness)?,
        })
    }
}

struct MdlLayout {
    size: usize,
    size_field: usize,
    mdl_flags: usize,
    process: usize,
    mapped_system_va: usize,
    start_va: usize,
    byte_count: usize,
    byte_offset: usize,
}

static MDL_32: MdlLayout = MdlLayout {
    size: 0x1C,
    size_field: 0x04,
    mdl_flags: 0x06,
    process: 0x08,
    mapped_system_va: 0x0C,
    start_va: 0x10,
    byte_count: 0x14,
    byte_offset: 0x18,
};

static MDL_64: MdlLayout = MdlLayout {
    size: 0x30,
    size_field: 0x08,
    mdl_flags: 0x0A,
    process: 0x10,
    mapped_system_va: 0x18,
    start_va: 0x20,
    byte_count: 0x28,
    byte_offset: 0x2C,
};

impl MdlLayout {
    fn for_bitness(bitness: Bitness) -> &'static MdlLayout {
        match bitness {
            Bitness::Bit32 => &MDL_32,
            Bitness::Bit64 => &MDL_64,
        }
    }
}

/// `MDL`, a memory descriptor list describing a locked buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mdl {
    /// `Next`
    pub next: u64,
    /// `Size`, the size of the MDL header plus its page frame array.
    pub size: u16,
    /// `MdlFlags`
    pub mdl_flags: u16,
    /// `Process`
    pub process: u64,
    /// `MappedSystemVa`
    pub mapped_system_va: u64,
    /// `StartVa`
    pub start_va: u64,
    /// `ByteCount`
    pub byte_count: u32,
    /// `ByteOffset`
    pub byte_offset: u32,
}

impl Mdl {
    /// An MDL describing `byte_count` bytes already mapped at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if `byte_count` exceeds the 32-bit `ByteCount` field.
    pub fn mapped(address: u64, byte_count: usize, bitness: Bitness) -> Result<Self> {
        let Ok(byte_count) = u32::try_from(byte_count) else {
            return Err(malformed_error!(
                "buffer of {} bytes cannot be described by an MDL",
                byte_count
            ));
        };

        Ok(Mdl {
            size: packed_size(Self::size_of(bitness))?,
            mdl_flags: MDL_MAPPED_TO_SYSTEM_VA,
            mapped_system_va: address,
            start_va: address,
            byte_count,
            ..Default::default()
        })
    }
}

impl KernelStruct for Mdl {
    fn size_of(bitness: Bitness) -> usize {
        MdlLayout::for_bitness(bitness).size
    }

    fn encode(&self, bitness: Bitness) -> Result<Vec<u8>> {
        let layout = MdlLayout::for_bitness(bitness);
        let mut data = vec![0u8; layout.size];

        write_ptr_into(&mut data, 0, self.next, bitness)?;
        write_le_into(&mut data, layout.size_field, self.size)?;
        write_le_into(&mut data, layout.mdl_flags, self.mdl_flags)?;
        write_ptr_into(&mut data, layout.process, self.process, bitness)?;
        write_ptr_into(&mut data, layout.mapped_system_va, self.mapped_system_va, bitness)?;
        write_ptr_into(&mut data, layout.start_va, self.start_va, bitness)?;
        write_le_into(&mut data, layout.byte_count, self.byte_count)?;
        write_le_into(&mut data, layout.byte_offset, self.byte_offset)?;

        Ok(data)
    }

    fn decode(data: &[u8], bitness: Bitness) -> Result<Self> {
        let layout = MdlLayout::for_bitness(bitness);

        Ok(Mdl {
            next: read_ptr_from(data, 0, bitness)?,
            size: read_le_from(data, layout.size_field)?,
            mdl_flags: read_le_from(data, layout.mdl_flags)?,
            process: read_ptr_from(data, layout.process, bitness)?,
            mapped_system_va: read_ptr_from(data, layout.mapped_system_va, bitness)?,
            start_va: read_ptr_from(data, layout.start_va, bitness)?,
            byte_count: read_le_from(data, layout.byte_count)?,
            byte_offset: read_le_from(data, layout.byte_offset)?,
        })
    }
}

struct DeviceLayout {
    size: usize,
    flags: usize,
    characteristics: usize,
    device_extension: usize,
    device_type: usize,
    stack_size: usize,
    alignment_requirement: usize,
    sector_size: usize,
}

static DEVICE_32: DeviceLayout = DeviceLayout {
    size: 0xB8,
    flags: 0x1C,
    characteristics: 0x20,
    device_extension: 0x28,
    device_type: 0x2C,
    stack_size: 0x30,
    alignment_requirement: 0x5C,
    sector_size: 0xAC,
};

static DEVICE_64: DeviceLayout = DeviceLayout {
    size: 0x150,
    flags: 0x30,
    characteristics: 0x34,
    device_extension: 0x40,
    device_type: 0x48,
    stack_size: 0x4C,
    alignment_requirement: 0x98,
    sector_size: 0x130,
};

impl DeviceLayout {
    fn for_bitness(bitness: Bitness) -> &'static DeviceLayout {
        match bitness {
            Bitness::Bit32 => &DEVICE_32,
            Bitness::Bit64 => &DEVICE_64,
        }
    }
}

/// `IO_TYPE_DEVICE`, the `Type` tag of every device object.
const IO_TYPE_DEVICE: u16 = 3;

/// `DEVICE_OBJECT`, the target device of a request.
///
/// Created by the driver during initialization; the I/O manager emulation only reads it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceObject {
    /// `DriverObject`
    pub driver_object: u64,
    /// `Flags`
    pub flags: DeviceFlags,
    /// `Characteristics`
    pub characteristics: u32,
    /// `DeviceExtension`
    pub device_extension: u64,
    /// `DeviceType`
    pub device_type: u32,
    /// `StackSize`
    pub stack_size: u8,
    /// `AlignmentRequirement`
    pub alignment_requirement: u32,
    /// `SectorSize`
    pub sector_size: u16,
}

impl Default for DeviceObject {
    fn default() -> Self {
        DeviceObject {
            driver_object: 0,
            flags: DeviceFlags::empty(),
            characteristics: 0,
            device_extension: 0,
            device_type: 0,
            stack_size: 1,
            alignment_requirement: 0,
            sector_size: 0,
        }
    }
}

impl KernelStruct for DeviceObject {
    fn size_of(bitness: Bitness) -> usize {
        DeviceLayout::for_bitness(bitness).size
    }

    fn encode(&self, bitness: Bitness) -> Result<Vec<u8>> {
        let layout = DeviceLayout::for_bitness(bitness);
        let mut data = vec![0u8; layout.size];

        write_le_into(&mut data, 0x00, IO_TYPE_DEVICE)?;
        write_le_into(&mut data, 0x02, packed_size(layout.size)?)?;
        write_ptr_into(&mut data, 0x08, self.driver_object, bitness)?;
        write_le_into(&mut data, layout.flags, self.flags.bits())?;
        write_le_into(&mut data, layout.characteristics, self.characteristics)?;
        write_ptr_into(&mut data, layout.device_extension, self.device_extension, bitness)?;
        write_le_into(&mut data, layout.device_type, self.device_type)?;
        write_le_into(&mut data, layout.stack_size, self.stack_size)?;
        write_le_into(&mut data, layout.alignment_requirement, self.alignment_requirement)?;
        write_le_into(&mut data, layout.sector_size, self.sector_size)?;

        Ok(data)
    }

    fn decode(data: &[u8], bitness: Bitness) -> Result<Self> {
        let layout = DeviceLayout::for_bitness(bitness);

        Ok(DeviceObject {
            driver_object: read_ptr_from(data, 0x08, bitness)?,
            flags: DeviceFlags::from_bits_retain(read_le_from(data, layout.flags)?),
            characteristics: read_le_from(data, layout.characteristics)?,
            device_extension: read_ptr_from(data, layout.device_extension, bitness)?,
            device_type: read_le_from(data, layout.device_type)?,
            stack_size: read_le_from(data, layout.stack_size)?,
            alignment_requirement: read_le_from(data, layout.alignment_requirement)?,
            sector_size: read_le_from(data, layout.sector_size)?,
        })
    }
}

fn packed_size(size: usize) -> Result<u16> {
    u16::try_from(size).map_err(|_| malformed_error!("structure size {} exceeds u16", size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn sizes_per_bitness() {
        assert_eq!(Irp::size_of(Bitness::Bit32), 0x70);
        assert_eq!(Irp::size_of(Bitness::Bit64), 0xD0);
        assert_eq!(IoStackLocation::size_of(Bitness::Bit32), 0x24);
        assert_eq!(IoStackLocation::size_of(Bitness::Bit64), 0x48);
        assert_eq!(Mdl::size_of(Bitness::Bit32), 0x1C);
        assert_eq!(Mdl::size_of(Bitness::Bit64), 0x30);
        assert_eq!(DeviceObject::size_of(Bitness::Bit32), 0xB8);
        assert_eq!(DeviceObject::size_of(Bitness::Bit64), 0x150);
    }

    #[test]
    fn irp_field_offsets_32() {
        let irp = Irp {
            mdl_address: 0x1111_1111,
            system_buffer: 0x2222_2222,
            io_status: IoStatusBlock {
                status: NtStatus::INVALID_DEVICE_REQUEST,
                information: 7,
            },
            stack_count: 1,
            current_location: 1,
            user_buffer: 0x3333_3333,
            current_stack_location: 0x4444_4444,
            ..Default::default()
        };
        let data = irp.encode(Bitness::Bit32).unwrap();

        assert_eq!(data.len(), 0x70);
        assert_eq!(&data[0x00..0x04], [6, 0, 0x70, 0]);
        assert_eq!(&data[0x04..0x08], [0x11; 4]);
        assert_eq!(&data[0x0C..0x10], [0x22; 4]);
        assert_eq!(&data[0x18..0x1C], [0x10, 0x00, 0x00, 0xC0]);
        assert_eq!(&data[0x1C..0x20], [7, 0, 0, 0]);
        assert_eq!(&data[0x22..0x24], [1, 1]);
        assert_eq!(&data[0x3C..0x40], [0x33; 4]);
        assert_eq!(&data[0x60..0x64], [0x44; 4]);
    }

    #[test]
    fn irp_field_offsets_64() {
        let irp = Irp {
            mdl_address: 0x1111_1111_1111_1111,
            system_buffer: 0x2222_2222_2222_2222,
            io_status: IoStatusBlock {
                status: NtStatus::SUCCESS,
                information: 0x0102,
            },
            user_buffer: 0x3333_3333_3333_3333,
            current_stack_location: 0x4444_4444_4444_4444,
            ..Default::default()
        };
        let data = irp.encode(Bitness::Bit64).unwrap();

        assert_eq!(&data[0x00..0x04], [6, 0, 0xD0, 0]);
        assert_eq!(&data[0x08..0x10], [0x11; 8]);
        assert_eq!(&data[0x18..0x20], [0x22; 8]);
        assert_eq!(&data[0x38..0x40], [0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&data[0x70..0x78], [0x33; 8]);
        assert_eq!(&data[0xB8..0xC0], [0x44; 8]);
        assert_eq!(Irp::decode(&data, Bitness::Bit64).unwrap(), irp);
    }

    #[test]
    fn stack_location_ioctl_offsets() {
        let stack = IoStackLocation::new(
            MajorFunction::DeviceControl,
            StackParameters::DeviceIoControl {
                output_buffer_length: 0x10,
                input_buffer_length: 0x20,
                io_control_code: 0x0022_2003,
                type3_input_buffer: 0x5555_5555,
            },
            0x6666_6666,
        );

        let data = stack.encode(Bitness::Bit32).unwrap();
        assert_eq!(data[0], 0x0E);
        assert_eq!(&data[0x04..0x08], [0x10, 0, 0, 0]);
        assert_eq!(&data[0x08..0x0C], [0x20, 0, 0, 0]);
        assert_eq!(&data[0x0C..0x10], [0x03, 0x20, 0x22, 0x00]);
        assert_eq!(&data[0x10..0x14], [0x55; 4]);
        assert_eq!(&data[0x14..0x18], [0x66; 4]);

        let data = stack.encode(Bitness::Bit64).unwrap();
        assert_eq!(&data[0x08..0x0C], [0x10, 0, 0, 0]);
        assert_eq!(&data[0x10..0x14], [0x20, 0, 0, 0]);
        assert_eq!(&data[0x18..0x1C], [0x03, 0x20, 0x22, 0x00]);
        assert_eq!(&data[0x20..0x28], [0x55, 0x55, 0x55, 0x55, 0, 0, 0, 0]);
        assert_eq!(&data[0x28..0x30], [0x66, 0x66, 0x66, 0x66, 0, 0, 0, 0]);
        assert_eq!(IoStackLocation::decode(&data, Bitness::Bit64).unwrap(), stack);
    }

    #[test]
    fn stack_location_write_length() {
        let stack = IoStackLocation::new(
            MajorFunction::Write,
            StackParameters::Write {
                length: 7,
                key: 0,
                byte_offset: 0,
            },
            0,
        );

        assert_eq!(stack.encode(Bitness::Bit32).unwrap()[0x04], 7);
        assert_eq!(stack.encode(Bitness::Bit64).unwrap()[0x08], 7);
    }

    #[test]
    fn mdl_offsets() {
        let mdl = Mdl::mapped(0x7788_99AA, 0x40, Bitness::Bit32).unwrap();
        let data = mdl.encode(Bitness::Bit32).unwrap();
        assert_eq!(&data[0x04..0x08], [0x1C, 0, 0x01, 0]);
        assert_eq!(&data[0x0C..0x10], [0xAA, 0x99, 0x88, 0x77]);
        assert_eq!(&data[0x10..0x14], [0xAA, 0x99, 0x88, 0x77]);
        assert_eq!(&data[0x14..0x18], [0x40, 0, 0, 0]);

        let mdl = Mdl::mapped(0x7788_99AA, 0x40, Bitness::Bit64).unwrap();
        let data = mdl.encode(Bitness::Bit64).unwrap();
        assert_eq!(&data[0x08..0x0C], [0x30, 0, 0x01, 0]);
        assert_eq!(&data[0x18..0x1C], [0xAA, 0x99, 0x88, 0x77]);
        assert_eq!(&data[0x20..0x24], [0xAA, 0x99, 0x88, 0x77]);
        assert_eq!(&data[0x28..0x2C], [0x40, 0, 0, 0]);
        assert_eq!(Mdl::decode(&data, Bitness::Bit64).unwrap(), mdl);
    }

    #[test]
    fn device_object_flags_offset() {
        for bitness in Bitness::iter() {
            let device = DeviceObject {
                flags: DeviceFlags::DIRECT_IO,
                device_type: 0x22,
                ..Default::default()
            };
            let data = device.encode(bitness).unwrap();
            let (flags, device_type) = match bitness {
                Bitness::Bit32 => (0x1C, 0x2C),
                Bitness::Bit64 => (0x30, 0x48),
            };

            assert_eq!(data[flags], 0x10);
            assert_eq!(data[device_type], 0x22);
            assert_eq!(DeviceObject::decode(&data, bitness).unwrap(), device);
        }
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let data = vec![0u8; 0x20];
        assert!(matches!(
            Irp::decode(&data, Bitness::Bit32),
            Err(crate::Error::OutOfBounds)
        ));
    }
}
