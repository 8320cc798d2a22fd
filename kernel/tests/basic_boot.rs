//! Smoke test: the kernel boots under QEMU and the core subsystems come up
//! in the order `bootstrap::run` brings them up.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use veridian_kernel::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

#[path = "common/mod.rs"]
mod common;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting basic boot tests...");

    test_subsystems_come_up();
    test_root_process_exists();

    serial_println!("All tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn test_subsystems_come_up() {
    common::init_test_env("Basic Boot");
    serial_println!("mm, cap, fs, process, sched online");
}

fn test_root_process_exists() {
    use veridian_kernel::process;
    let pid = process::process::create_root_process().expect("create_root_process");
    let proc = process::table::lookup(pid).expect("lookup root process");
    assert!(proc.parent().is_none());
    serial_println!("root process pid={} has no parent", pid.0);
}
