//! The loader-provided driver object.

use strum::{EnumCount, IntoEnumIterator};

use crate::{emulation::kernel::constants::MajorFunction, Result};

/// The driver whose dispatch routines receive emulated requests.
///
/// Implemented by the embedder's PE loader once `DriverEntry` has run and the driver has
/// created its device and filled in `DRIVER_OBJECT.MajorFunction`.
pub trait DriverObject {
    /// Guest address of the driver's device object.
    fn device_object(&self) -> u64;

    /// Guest address of the dispatch routine for `function`, or `0` if none is registered.
    fn major_function(&self, function: MajorFunction) -> u64;
}

/// A plain dispatch table, for embedders that track the driver object outside guest memory.
///
/// # Example
///
/// ```rust
/// use drvscope::emulation::kernel::{DriverDispatchTable, DriverObject, MajorFunction};
///
/// let driver = DriverDispatchTable::new(0x8000_1000)
///     .with(MajorFunction::Write, 0x0040_1200);
///
/// assert_eq!(driver.major_function(MajorFunction::Write), 0x0040_1200);
/// assert_eq!(driver.major_function(MajorFunction::DeviceControl), 0);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverDispatchTable {
    device_object: u64,
    major_functions: [u64; MajorFunction::COUNT],
}

impl DriverDispatchTable {
    /// Creates a table for `device_object` with no registered routines.
    #[must_use]
    pub fn new(device_object: u64) -> Self {
        DriverDispatchTable {
            device_object,
            major_functions: [0; MajorFunction::COUNT],
        }
    }

    /// Registers `routine` for `function` and returns the table.
    #[must_use]
    pub fn with(mut self, function: MajorFunction, routine: u64) -> Self {
        self.set(function, routine);
        self
    }

    /// Registers `routine` for `function`; `0` unregisters it.
    pub fn set(&mut self, function: MajorFunction, routine: u64) {
        self.major_functions[function.index()] = routine;
    }

    /// Registers `routine` for a raw major function code.
    ///
    /// # Errors
    ///
    /// Returns [`crate::emulation::EmulationError::InvalidMajorFunction`] if `code` exceeds
    /// `IRP_MJ_MAXIMUM_FUNCTION`.
    pub fn set_code(&mut self, code: u8, routine: u64) -> Result<()> {
        let function = MajorFunction::try_from(code)?;
        self.set(function, routine);
        Ok(())
    }

    /// Replaces the device object address.
    pub fn set_device_object(&mut self, device_object: u64) {
        self.device_object = device_object;
    }

    /// Iterates over the registered routines.
    pub fn registered(&self) -> impl Iterator<Item = (MajorFunction, u64)> + '_ {
        MajorFunction::iter()
            .map(|function| (function, self.major_functions[function.index()]))
            .filter(|(_, routine)| *routine != 0)
    }
}

impl DriverObject for DriverDispatchTable {
    fn device_object(&self) -> u64 {
        self.device_object
    }

    fn major_function(&self, function: MajorFunction) -> u64 {
        self.major_functions[function.index()]
    }
}
