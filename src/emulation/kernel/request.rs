//! Emulated I/O manager requests.
//!
//! [`IoRequestEmulator`] plays the role of the Windows I/O manager for a driver running
//! under emulation: it builds the IRP, its stack location and the buffers the transfer
//! method calls for in guest memory, calls the driver's dispatch routine with
//! `(DeviceObject, Irp)` and reads the completion status back.
//!
//! # Buffer allocation
//!
//! Every block is allocated through a [`ScratchScope`] and released when the request ends,
//! whatever the outcome. Allocation order per request:
//!
//! | Request | Order |
//! |---------|-------|
//! | write | IRP, stack location, then system buffer (buffered), mapped buffer + MDL (direct) or user buffer (neither) |
//! | IOCTL | input buffer, output buffer, IRP, stack location, system buffer, then mapped buffer + MDL for the direct methods |
//!
//! # Example
//!
//! ```rust,ignore
//! use drvscope::emulation::{kernel::*, ReturnSiteClassifier};
//!
//! let driver = DriverDispatchTable::new(device_address)
//!     .with(MajorFunction::DeviceControl, dispatch_address);
//! let mut requests = IoRequestEmulator::new(&driver, ReturnSiteClassifier::new(0xDEAD_0000));
//!
//! let code = IoctlCode::new(0x22, 0x800, TransferMethod::Buffered, 0);
//! let outcome = requests.io_control(&mut machine, code, 64, b"ping")?;
//! if outcome.is_success() {
//!     println!("driver answered {:?}", outcome.output);
//! }
//! ```

use log::{debug, warn};

use crate::{
    emulation::{
        engine::{EmulationError, FaultClassifier, FaultVerdict, GuestMachine, ParamKind},
        kernel::{
            constants::{IoBuffering, MajorFunction, NtStatus, TransferMethod},
            driver::DriverObject,
            ioctl::IoctlCode,
            structs::{DeviceObject, IoStackLocation, Irp, KernelStruct, Mdl, StackParameters},
        },
        memory::{GuestHeap, GuestMemory, ScratchScope},
    },
    Result,
};

/// Result of an emulated write request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteOutcome {
    /// `NT_SUCCESS` of the completion status; `false` if the request was not supported.
    pub success: bool,
    /// `IoStatus.Information`; `None` if the request was not supported.
    pub information: Option<u64>,
}

impl WriteOutcome {
    /// The outcome of a write to a driver without a write routine.
    #[must_use]
    pub fn unsupported() -> Self {
        WriteOutcome {
            success: false,
            information: None,
        }
    }
}

/// Result of an emulated device-control request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IoctlOutcome {
    /// Completion status; `None` if the request was not supported.
    pub status: Option<NtStatus>,
    /// `IoStatus.Information`; `None` if the request was not supported.
    pub information: Option<u64>,
    /// Output returned by the driver; empty unless the request succeeded.
    pub output: Vec<u8>,
}

impl IoctlOutcome {
    /// The outcome of a device-control request to a driver without a device-control routine.
    #[must_use]
    pub fn unsupported() -> Self {
        IoctlOutcome::default()
    }

    /// Returns `true` if the driver had a routine for the request.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.status.is_some()
    }

    /// Returns `true` if the driver completed the request with a success status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_some_and(NtStatus::is_success)
    }
}

/// Issues write and device-control requests to an emulated driver.
pub struct IoRequestEmulator<'a, D: ?Sized, F> {
    driver: &'a D,
    classifier: F,
}

impl<'a, D, F> IoRequestEmulator<'a, D, F>
where
    D: DriverObject + ?Sized,
    F: FaultClassifier,
{
    /// Creates an emulator for `driver` that judges dispatch faults with `classifier`.
    pub fn new(driver: &'a D, classifier: F) -> Self {
        IoRequestEmulator { driver, classifier }
    }

    /// The driver requests are sent to.
    #[must_use]
    pub fn driver(&self) -> &'a D {
        self.driver
    }

    /// Sends `input` to the driver as an `IRP_MJ_WRITE` request.
    ///
    /// The buffering is taken from the device object's flags: buffered I/O stages the input
    /// in a system buffer, direct I/O in an MDL-described buffer, and neither I/O hands the
    /// buffer to the driver through `Irp->UserBuffer`.
    ///
    /// # Errors
    ///
    /// Returns an error if guest memory or heap access fails, or if the dispatch routine
    /// raised a fault the classifier deemed fatal.
    pub fn io_write<M>(&mut self, machine: &mut M, input: &[u8]) -> Result<WriteOutcome>
    where
        M: GuestMachine + ?Sized,
    {
        let routine = self.driver.major_function(MajorFunction::Write);
        if routine == 0 {
            debug!("{} is not registered", MajorFunction::Write);
            return Ok(WriteOutcome::unsupported());
        }

        let device_address = self.driver.device_object();
        let device = DeviceObject::read_from(&*machine, device_address)?;
        let buffering = IoBuffering::from(device.flags);
        let bitness = machine.bitness();
        let length = buffer_length(input.len())?;

        let mut scratch = ScratchScope::new(machine);
        let irp_address = scratch.alloc(Irp::size_of(bitness))?;
        let stack_address = scratch.alloc(IoStackLocation::size_of(bitness))?;

        let stack = IoStackLocation::new(
            MajorFunction::Write,
            StackParameters::Write {
                length,
                key: 0,
                byte_offset: 0,
            },
            device_address,
        );
        stack.write_to(&mut *scratch, stack_address)?;

        let mut irp = initial_irp(stack_address);
        match buffering {
            IoBuffering::Buffered => irp.system_buffer = scratch.alloc_with(input)?,
            IoBuffering::Direct => {
                let (_, mdl_address) = build_mdl(&mut scratch, input.len(), Some(input))?;
                irp.mdl_address = mdl_address;
            }
            IoBuffering::Neither => irp.user_buffer = scratch.alloc_with(input)?,
        }
        irp.write_to(&mut *scratch, irp_address)?;

        debug!(
            "executing write with DeviceObject = 0x{device_address:X}, IRP = 0x{irp_address:X} ({buffering} I/O)"
        );
        let completed = self.dispatch(&mut *scratch, routine, device_address, irp_address)?;
        finish(scratch);

        Ok(WriteOutcome {
            success: completed.io_status.status.is_success(),
            information: Some(completed.io_status.information),
        })
    }

    /// Sends an `IRP_MJ_DEVICE_CONTROL` request with the given control code.
    ///
    /// The transfer method in the low bits of `code` selects where the driver finds the
    /// input and leaves its output. On success the output is read from that location, sized
    /// to `IoStatus.Information` and never longer than `output_size`.
    ///
    /// # Errors
    ///
    /// Returns an error if guest memory or heap access fails, or if the dispatch routine
    /// raised a fault the classifier deemed fatal.
    pub fn io_control<M>(
        &mut self,
        machine: &mut M,
        code: IoctlCode,
        output_size: usize,
        input: &[u8],
    ) -> Result<IoctlOutcome>
    where
        M: GuestMachine + ?Sized,
    {
        let routine = self.driver.major_function(MajorFunction::DeviceControl);
        if routine == 0 {
            debug!("{} is not registered", MajorFunction::DeviceControl);
            return Ok(IoctlOutcome::unsupported());
        }

        let device_address = self.driver.device_object();
        let method = code.method();
        let bitness = machine.bitness();
        let output_buffer_length = buffer_length(output_size)?;
        let input_buffer_length = buffer_length(input.len())?;

        let mut scratch = ScratchScope::new(machine);
        let input_address = scratch.alloc_with(input)?;
        let output_address = scratch.alloc(output_size)?;
        let irp_address = scratch.alloc(Irp::size_of(bitness))?;
        let stack_address = scratch.alloc(IoStackLocation::size_of(bitness))?;
        debug!("IRP is at 0x{irp_address:X}, IO_STACK_LOCATION is at 0x{stack_address:X}");

        let stack = IoStackLocation::new(
            MajorFunction::DeviceControl,
            StackParameters::DeviceIoControl {
                output_buffer_length,
                input_buffer_length,
                io_control_code: code.raw(),
                type3_input_buffer: input_address,
            },
            device_address,
        );
        stack.write_to(&mut *scratch, stack_address)?;

        let mut irp = initial_irp(stack_address);
        if method == TransferMethod::Neither {
            irp.user_buffer = output_address;
        }

        let system_buffer = scratch.alloc(input.len().max(output_size))?;
        scratch.write(system_buffer, input)?;
        irp.system_buffer = system_buffer;

        let mut mapped_buffer = 0;
        if method.is_direct() {
            let (mdl, mdl_address) = build_mdl(&mut scratch, output_size, None)?;
            mapped_buffer = mdl.mapped_system_va;
            irp.mdl_address = mdl_address;
        }
        irp.write_to(&mut *scratch, irp_address)?;

        debug!(
            "executing IOCTL {code} with DeviceObject = 0x{device_address:X}, IRP = 0x{irp_address:X}"
        );
        let completed = self.dispatch(&mut *scratch, routine, device_address, irp_address)?;

        let status = completed.io_status.status;
        let information = completed.io_status.information;
        let output = if status.is_success() {
            let source = match method {
                TransferMethod::Buffered => system_buffer,
                TransferMethod::InDirect | TransferMethod::OutDirect => mapped_buffer,
                TransferMethod::Neither => output_address,
            };
            let length = usize::try_from(information)
                .unwrap_or(usize::MAX)
                .min(output_size);
            scratch.read(source, length)?
        } else {
            Vec::new()
        };
        finish(scratch);

        Ok(IoctlOutcome {
            status: Some(status),
            information: Some(information),
            output,
        })
    }

    /// Calls `routine(device, irp)` and reads the IRP back once the routine has returned.
    fn dispatch<M>(
        &mut self,
        machine: &mut M,
        routine: u64,
        device_address: u64,
        irp_address: u64,
    ) -> Result<Irp>
    where
        M: GuestMachine + ?Sized,
    {
        machine.write_params(&[
            (ParamKind::Pointer, device_address),
            (ParamKind::Pointer, irp_address),
        ])?;

        if let Err(fault) = machine.run_until_return(routine) {
            match self.classifier.classify(&fault) {
                FaultVerdict::Benign => debug!("dispatch routine 0x{routine:X} stopped: {fault}"),
                FaultVerdict::Fatal => {
                    warn!("dispatch routine 0x{routine:X} faulted: {fault}");
                    return Err(EmulationError::DispatchFault { routine, fault }.into());
                }
            }
        }

        Irp::read_from(&*machine, irp_address)
    }
}

/// An IRP with a single stack location, positioned on it.
fn initial_irp(stack_address: u64) -> Irp {
    Irp {
        stack_count: 1,
        current_location: 1,
        current_stack_location: stack_address,
        ..Default::default()
    }
}

/// Allocates a buffer of `size` bytes and an MDL describing it.
fn build_mdl<M>(
    scratch: &mut ScratchScope<'_, M>,
    size: usize,
    data: Option<&[u8]>,
) -> Result<(Mdl, u64)>
where
    M: GuestMemory + GuestHeap + ?Sized,
{
    let bitness = scratch.bitness();
    let mapped_address = scratch.alloc(size)?;
    if let Some(data) = data {
        let written = &data[..data.len().min(size)];
        scratch.write(mapped_address, written)?;
    }

    let mdl = Mdl::mapped(mapped_address, size, bitness)?;
    let mdl_address = scratch.alloc(Mdl::size_of(bitness))?;
    mdl.write_to(&mut **scratch, mdl_address)?;

    Ok((mdl, mdl_address))
}

fn buffer_length(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| malformed_error!("buffer of {} bytes is too large", len))
}

/// Releases the request's scratch memory without masking the request's own result.
fn finish<M: GuestHeap + ?Sized>(scratch: ScratchScope<'_, M>) {
    if let Err(error) = scratch.release() {
        warn!("failed to release request memory: {error}");
    }
}
