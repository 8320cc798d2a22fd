//! RCU shared-pointer integration tests: strong/weak refcounting and read
//! guards exercised the way the capability registry and process tree use
//! them to publish shared kernel objects.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(veridian_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use veridian_kernel::{
    kernel_assert, kernel_assert_eq,
    serial_println,
    sync::{rcu, rcu_make_shared, RcuReadGuard, RcuShared},
};

#[path = "common/mod.rs"]
mod common;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    common::init_test_env("RCU Tests");
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
fn cloning_a_shared_value_bumps_the_strong_count() {
    let a = rcu_make_shared(42u64);
    kernel_assert_eq!(RcuShared::strong_count(&a), 1);

    let b = a.clone();
    kernel_assert_eq!(RcuShared::strong_count(&a), 2);
    kernel_assert_eq!(*b, 42);
    kernel_assert!(RcuShared::ptr_eq(&a, &b));
}

#[test_case]
fn weak_upgrade_succeeds_while_a_strong_ref_is_held() {
    let a = rcu_make_shared(7u64);
    let weak = RcuShared::downgrade(&a);
    kernel_assert_eq!(RcuShared::weak_count(&a), 1);

    let upgraded = weak.upgrade().expect("upgrade while strong ref lives");
    kernel_assert_eq!(*upgraded, 7);
    kernel_assert_eq!(RcuShared::strong_count(&a), 2);
}

#[test_case]
fn weak_upgrade_fails_once_every_strong_ref_is_dropped() {
    let weak = {
        let a = rcu_make_shared(9u64);
        RcuShared::downgrade(&a)
    };
    kernel_assert!(weak.upgrade().is_none());
}

#[test_case]
fn read_guard_marks_and_clears_the_reading_flag() {
    kernel_assert!(!rcu::rcu_is_reading());
    {
        let _guard = RcuReadGuard::new();
        kernel_assert!(rcu::rcu_is_reading());
    }
    kernel_assert!(!rcu::rcu_is_reading());
}
