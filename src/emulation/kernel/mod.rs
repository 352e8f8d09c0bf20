//! Windows kernel I/O manager emulation.
//!
//! This module lets a kernel-mode driver running under emulation receive write and
//! device-control requests exactly as the real I/O manager would deliver them.
//!
//! # Architecture
//!
//! - [`constants`] - major function codes, transfer methods, device flags, `NTSTATUS`
//! - [`structs`] - `IRP`, `IO_STACK_LOCATION`, `MDL` and `DEVICE_OBJECT` in both native
//!   layouts, behind the [`KernelStruct`] trait
//! - [`ioctl`] - packing and unpacking of IOCTL control codes
//! - [`driver`] - the loader-provided [`DriverObject`] and a plain [`DriverDispatchTable`]
//! - [`request`] - the [`IoRequestEmulator`] that builds, dispatches and recovers requests

pub mod constants;
pub mod driver;
pub mod ioctl;
pub mod request;
pub mod structs;

pub use constants::{
    DeviceFlags, IoBuffering, MajorFunction, NtStatus, TransferMethod, IO_TYPE_IRP,
    IRP_MJ_DEVICE_CONTROL, IRP_MJ_MAXIMUM_FUNCTION, IRP_MJ_WRITE, MDL_MAPPED_TO_SYSTEM_VA,
};
pub use driver::{DriverDispatchTable, DriverObject};
pub use ioctl::{ioctl_code, IoctlCode};
pub use request::{IoRequestEmulator, IoctlOutcome, WriteOutcome};
pub use structs::{
    DeviceObject, IoStackLocation, IoStatusBlock, Irp, KernelStruct, Mdl, StackParameters,
};
