//! Scheduler integration tests: the runnable queue and the logical context
//! switch working together across more than one thread.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(veridian_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use veridian_kernel::{
    kernel_assert, kernel_assert_eq,
    process::{ProcessId, ScheduleState},
    process::thread,
    sched::{self, queue},
    serial_println,
};

#[path = "common/mod.rs"]
mod common;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    common::init_test_env("Scheduler Tests");
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
fn enqueued_thread_is_served_fifo() {
    thread::init();
    while queue::get_work_item().is_some() {}

    let (a, _) = thread::spawn(ProcessId(1), 0xffff_8000_0030_0000, 0x1000, 0x7fff_0000)
        .expect("spawn a");
    let (b, _) = thread::spawn(ProcessId(1), 0xffff_8000_0031_0000, 0x1000, 0x7ffe_0000)
        .expect("spawn b");

    sched::add_work_item(a.tid());
    sched::add_work_item(b.tid());

    kernel_assert_eq!(a.state(), ScheduleState::Ready);
    kernel_assert_eq!(queue::get_work_item(), Some(a.tid()));
    kernel_assert_eq!(queue::get_work_item(), Some(b.tid()));
}

#[test_case]
fn popped_thread_transitions_ready_to_running_exactly_once() {
    thread::init();
    while queue::get_work_item().is_some() {}

    let (t, _) = thread::spawn(ProcessId(2), 0xffff_8000_0032_0000, 0x1000, 0x7ffd_0000)
        .expect("spawn");
    sched::add_work_item(t.tid());
    kernel_assert_eq!(t.state(), ScheduleState::Ready);

    kernel_assert!(t.schedule_state().try_start_running());
    kernel_assert_eq!(t.state(), ScheduleState::Running);
    // Already running: a second racing CPU must not also win the transition.
    kernel_assert!(!t.schedule_state().try_start_running());
}
