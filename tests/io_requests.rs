//! End-to-end write and device-control requests against a scripted driver.

mod common;

use common::{complete, full_driver, DriverHarness, IOCTL_ROUTINE, WRITE_ROUTINE};
use drvscope::{
    emulation::kernel::{
        ioctl_code, DeviceFlags, DriverDispatchTable, IoStackLocation, Irp, KernelStruct, Mdl,
        StackParameters, MDL_MAPPED_TO_SYSTEM_VA,
    },
    prelude::*,
};

/// Guest buffer the buffered write routine copies its payload into.
const SINK_ADDRESS: u64 = 0x00A0_0000;

#[test]
fn buffered_write_end_to_end() {
    for bitness in [Bitness::Bit32, Bitness::Bit64] {
        let mut machine = DriverHarness::new(bitness, DeviceFlags::BUFFERED_IO);
        machine.memory.map(SINK_ADDRESS, &[0; 16]).unwrap();

        machine.routine(WRITE_ROUTINE, |memory, params| {
            let irp = Irp::read_from(&*memory, params[1]).unwrap();
            let stack = IoStackLocation::read_from(&*memory, irp.current_stack_location).unwrap();
            let StackParameters::Write { length, .. } = stack.parameters else {
                panic!("write request without write parameters");
            };

            let data = memory.read(irp.system_buffer, length as usize).unwrap();
            memory.write(SINK_ADDRESS, &data).unwrap();
            complete(memory, params[1], NtStatus::SUCCESS, u64::from(length));
            Ok(())
        });

        let session = EmulationSession::default();
        let outcome = session
            .io_write(&mut machine, &full_driver(), StrictClassifier, b"PAYLOAD")
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.information, Some(7));
        assert_eq!(machine.memory.read(SINK_ADDRESS, 8).unwrap(), b"PAYLOAD\0");
        assert_eq!(machine.memory.live_allocations(), 0);
        assert_eq!(machine.memory.total_allocations(), machine.memory.total_releases());
    }
}

#[test]
fn direct_write_goes_through_mdl() {
    let mut machine = DriverHarness::new(Bitness::Bit64, DeviceFlags::DIRECT_IO);
    machine.routine(WRITE_ROUTINE, |memory, params| {
        let irp = Irp::read_from(&*memory, params[1]).unwrap();
        assert_eq!(irp.system_buffer, 0);
        assert_ne!(irp.mdl_address, 0);

        let mdl = Mdl::read_from(&*memory, irp.mdl_address).unwrap();
        assert_eq!(mdl.byte_count, 5);
        assert_ne!(mdl.mdl_flags & MDL_MAPPED_TO_SYSTEM_VA, 0);
        assert_eq!(memory.read(mdl.mapped_system_va, 5).unwrap(), b"hello");

        complete(memory, params[1], NtStatus::SUCCESS, 5);
        Ok(())
    });

    let outcome = EmulationSession::default()
        .io_write(&mut machine, &full_driver(), StrictClassifier, b"hello")
        .unwrap();

    assert!(outcome.success);
    assert_eq!(machine.memory.total_allocations(), 4);
    assert_eq!(machine.memory.live_allocations(), 0);
}

#[test]
fn neither_write_uses_user_buffer() {
    let mut machine = DriverHarness::new(Bitness::Bit32, DeviceFlags::empty());
    machine.routine(WRITE_ROUTINE, |memory, params| {
        let irp = Irp::read_from(&*memory, params[1]).unwrap();
        assert_eq!(irp.system_buffer, 0);
        assert_eq!(irp.mdl_address, 0);
        assert_eq!(memory.read(irp.user_buffer, 3).unwrap(), b"raw");

        complete(memory, params[1], NtStatus::SUCCESS, 3);
        Ok(())
    });

    let outcome = EmulationSession::default()
        .io_write(&mut machine, &full_driver(), StrictClassifier, b"raw")
        .unwrap();
    assert_eq!(outcome.information, Some(3));
}

#[test]
fn unregistered_device_control_is_unsupported() {
    let mut machine = DriverHarness::new(Bitness::Bit64, DeviceFlags::BUFFERED_IO);
    let driver = DriverDispatchTable::new(common::DEVICE_ADDRESS)
        .with(MajorFunction::Write, WRITE_ROUTINE);
    let before = machine.memory.current_size();

    let outcome = EmulationSession::default()
        .io_control(
            &mut machine,
            &driver,
            StrictClassifier,
            IoctlCode::from(0x0022_2000),
            16,
            b"in",
        )
        .unwrap();

    assert_eq!(outcome, IoctlOutcome::unsupported());
    assert_eq!(outcome.status, None);
    assert_eq!(outcome.information, None);
    assert!(outcome.output.is_empty());
    assert_eq!(machine.memory.total_allocations(), 0);
    assert_eq!(machine.memory.current_size(), before);
    assert!(machine.dispatched.is_empty());
}

#[test]
fn device_control_methods() {
    let cases = [
        (TransferMethod::Buffered, 5),
        (TransferMethod::InDirect, 7),
        (TransferMethod::OutDirect, 7),
        (TransferMethod::Neither, 5),
    ];

    for bitness in [Bitness::Bit32, Bitness::Bit64] {
        for (method, allocations) in cases {
            let mut machine = DriverHarness::new(bitness, DeviceFlags::BUFFERED_IO);
            machine.routine(IOCTL_ROUTINE, move |memory, params| {
                let irp = Irp::read_from(&*memory, params[1]).unwrap();
                let stack =
                    IoStackLocation::read_from(&*memory, irp.current_stack_location).unwrap();
                let StackParameters::DeviceIoControl {
                    input_buffer_length,
                    output_buffer_length,
                    io_control_code,
                    type3_input_buffer,
                } = stack.parameters
                else {
                    panic!("device control without IOCTL parameters");
                };

                assert_eq!(io_control_code & 3, method.bits());
                assert_eq!(input_buffer_length, 4);
                assert_eq!(output_buffer_length, 8);
                assert_eq!(memory.read(type3_input_buffer, 4).unwrap(), b"ping");
                assert_eq!(memory.read(irp.system_buffer, 4).unwrap(), b"ping");

                let target = match method {
                    TransferMethod::Buffered => irp.system_buffer,
                    TransferMethod::InDirect | TransferMethod::OutDirect => {
                        Mdl::read_from(&*memory, irp.mdl_address)
                            .unwrap()
                            .mapped_system_va
                    }
                    TransferMethod::Neither => irp.user_buffer,
                };
                memory.write(target, b"pong").unwrap();
                complete(memory, params[1], NtStatus::SUCCESS, 4);
                Ok(())
            });

            let code = IoctlCode::new(0x22, 0x900, method, 0);
            let outcome = EmulationSession::default()
                .io_control(&mut machine, &full_driver(), StrictClassifier, code, 8, b"ping")
                .unwrap();

            assert_eq!(outcome.status, Some(NtStatus::SUCCESS), "{bitness} {method}");
            assert_eq!(outcome.information, Some(4));
            assert_eq!(outcome.output, b"pong", "{bitness} {method}");
            assert_eq!(machine.memory.total_allocations(), allocations, "{bitness} {method}");
            assert_eq!(machine.memory.live_allocations(), 0);
        }
    }
}

#[test]
fn failed_device_control_returns_no_output() {
    let mut machine = DriverHarness::new(Bitness::Bit64, DeviceFlags::BUFFERED_IO);
    machine.routine(IOCTL_ROUTINE, |memory, params| {
        complete(memory, params[1], NtStatus::BUFFER_TOO_SMALL, 0);
        Ok(())
    });

    let code = IoctlCode::new(0x22, 0x901, TransferMethod::Buffered, 0);
    let outcome = EmulationSession::default()
        .io_control(&mut machine, &full_driver(), StrictClassifier, code, 8, b"x")
        .unwrap();

    assert_eq!(outcome.status, Some(NtStatus::BUFFER_TOO_SMALL));
    assert!(!outcome.is_success());
    assert!(outcome.output.is_empty());
}

#[test]
fn fatal_fault_releases_everything() {
    let mut machine = DriverHarness::new(Bitness::Bit32, DeviceFlags::BUFFERED_IO);
    machine.routine(IOCTL_ROUTINE, |_, _| {
        Err(CpuFault::new(FaultKind::WriteUnmapped, 0))
    });

    let code = IoctlCode::new(0x22, 0x902, TransferMethod::OutDirect, 0);
    let result = EmulationSession::default().io_control(
        &mut machine,
        &full_driver(),
        StrictClassifier,
        code,
        8,
        b"x",
    );

    assert!(matches!(
        result,
        Err(Error::Emulation(EmulationError::DispatchFault { .. }))
    ));
    assert_eq!(machine.memory.total_allocations(), 7);
    assert_eq!(machine.memory.total_releases(), 7);
}

#[test]
fn return_site_stop_is_benign() {
    const STOP: u64 = 0xFFFF_0000;

    let mut machine = DriverHarness::new(Bitness::Bit64, DeviceFlags::BUFFERED_IO);
    machine.routine(WRITE_ROUTINE, |memory, params| {
        complete(memory, params[1], NtStatus::SUCCESS, 2);
        Err(CpuFault::new(FaultKind::FetchUnmapped, STOP))
    });

    let outcome = EmulationSession::default()
        .io_write(
            &mut machine,
            &full_driver(),
            ReturnSiteClassifier::new(STOP),
            b"ok",
        )
        .unwrap();
    assert!(outcome.success);
}

#[test]
fn control_code_packing() {
    for method in [
        TransferMethod::Buffered,
        TransferMethod::InDirect,
        TransferMethod::OutDirect,
        TransferMethod::Neither,
    ] {
        let raw = ioctl_code(0x22, 0x800, method.bits(), 0);
        assert_eq!(raw & 3, method.bits());
        assert_eq!(IoctlCode::from(raw).method(), method);
    }
}
