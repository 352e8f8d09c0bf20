//! Shared harness for the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;

use drvscope::{
    emulation::kernel::{DeviceFlags, DeviceObject, DriverDispatchTable, KernelStruct},
    prelude::*,
};

pub type Routine = Box<dyn FnMut(&mut SandboxMemory, &[u64]) -> std::result::Result<(), CpuFault>>;

/// Where `DriverHarness::new` maps the device object.
pub const DEVICE_ADDRESS: u64 = 0x0090_0000;
pub const WRITE_ROUTINE: u64 = 0x0040_1000;
pub const IOCTL_ROUTINE: u64 = 0x0040_2000;

/// A guest machine whose driver routines are Rust closures.
pub struct DriverHarness {
    pub memory: SandboxMemory,
    routines: HashMap<u64, Routine>,
    params: Vec<u64>,
    pub dispatched: Vec<(u64, Vec<u64>)>,
    pc: u64,
    sp: u64,
}

impl DriverHarness {
    /// A harness with a device object using `flags`, mapped at [`DEVICE_ADDRESS`].
    pub fn new(bitness: Bitness, flags: DeviceFlags) -> Self {
        init_logging();

        let mut memory = SandboxMemory::new(bitness, 4 * 1024 * 1024);
        let device = DeviceObject {
            flags,
            device_type: 0x22,
            ..Default::default()
        };
        memory
            .map(DEVICE_ADDRESS, &device.encode(bitness).unwrap())
            .unwrap();

        DriverHarness {
            memory,
            routines: HashMap::new(),
            params: Vec::new(),
            dispatched: Vec::new(),
            pc: 0,
            sp: 0,
        }
    }

    pub fn routine<H>(&mut self, entry: u64, routine: H)
    where
        H: FnMut(&mut SandboxMemory, &[u64]) -> std::result::Result<(), CpuFault> + 'static,
    {
        self.routines.insert(entry, Box::new(routine));
    }
}

/// Routes the crate's `log` output to the test harness; `RUST_LOG=debug` shows request traces.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A dispatch table with both request routines registered.
pub fn full_driver() -> DriverDispatchTable {
    DriverDispatchTable::new(DEVICE_ADDRESS)
        .with(MajorFunction::Write, WRITE_ROUTINE)
        .with(MajorFunction::DeviceControl, IOCTL_ROUTINE)
}

/// Sets the IRP's completion status the way `IoCompleteRequest` callers do.
pub fn complete(memory: &mut SandboxMemory, irp_address: u64, status: NtStatus, information: u64) {
    let mut irp = drvscope::emulation::kernel::Irp::read_from(&*memory, irp_address).unwrap();
    irp.io_status.status = status;
    irp.io_status.information = information;
    irp.write_to(memory, irp_address).unwrap();
}

impl GuestMemory for DriverHarness {
    fn bitness(&self) -> Bitness {
        self.memory.bitness()
    }

    fn read(&self, address: u64, len: usize) -> drvscope::Result<Vec<u8>> {
        self.memory.read(address, len)
    }

    fn write(&mut self, address: u64, data: &[u8]) -> drvscope::Result<()> {
        self.memory.write(address, data)
    }
}

impl GuestHeap for DriverHarness {
    fn alloc(&mut self, size: usize) -> drvscope::Result<u64> {
        self.memory.alloc(size)
    }

    fn free(&mut self, address: u64) -> drvscope::Result<()> {
        self.memory.free(address)
    }
}

impl CpuEngine for DriverHarness {
    fn run_until_return(&mut self, entry: u64) -> std::result::Result<(), CpuFault> {
        self.dispatched.push((entry, self.params.clone()));
        match self.routines.get_mut(&entry) {
            Some(routine) => routine(&mut self.memory, &self.params),
            None => Err(CpuFault::new(FaultKind::FetchUnmapped, entry)),
        }
    }

    fn program_counter(&self) -> drvscope::Result<u64> {
        Ok(self.pc)
    }

    fn set_program_counter(&mut self, value: u64) -> drvscope::Result<()> {
        self.pc = value;
        Ok(())
    }

    fn stack_pointer(&self) -> drvscope::Result<u64> {
        Ok(self.sp)
    }

    fn set_stack_pointer(&mut self, value: u64) -> drvscope::Result<()> {
        self.sp = value;
        Ok(())
    }
}

impl CallingConvention for DriverHarness {
    fn write_params(&mut self, params: &[(ParamKind, u64)]) -> drvscope::Result<()> {
        self.params = params.iter().map(|(_, value)| *value).collect();
        Ok(())
    }
}
