//! Physical/virtual memory manager integration tests: frame allocation,
//! virtual range reservation, and page-table mapping exercised together the
//! way a process's address space setup really calls them.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(veridian_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use veridian_kernel::{
    kernel_assert, kernel_assert_eq,
    mm::{frame_allocator, PageFlags, PageTables, VirtualAddress, VirtualAllocator},
    serial_println,
};

#[path = "common/mod.rs"]
mod common;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    common::init_test_env("Memory Tests");
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
fn frame_allocation_yields_distinct_frames() {
    let a = frame_allocator::allocate_frame().expect("allocate a");
    let b = frame_allocator::allocate_frame().expect("allocate b");
    kernel_assert!(a.number() != b.number());
}

#[test_case]
fn user_allocator_reserves_distinct_ranges() {
    let allocator = VirtualAllocator::new_user(256 * 1024 * 1024);
    let first = allocator.alloc4k(4).expect("alloc4k");
    let second = allocator.alloc4k(4).expect("alloc4k");
    kernel_assert!(first != second);
    allocator.release4k(first, 4);
    allocator.release4k(second, 4);
}

#[test_case]
fn mapped_page_translates_to_its_backing_frame() {
    let tables = PageTables::new(8).expect("page tables");
    let frame = frame_allocator::allocate_frame().expect("frame");
    let phys = frame.number().as_addr();
    let virt = VirtualAddress::new(0x2000_0000);

    tables
        .map(phys, virt, 0x1000, PageFlags::PRESENT | PageFlags::WRITABLE)
        .expect("map");
    kernel_assert_eq!(tables.translate(virt), Some(phys));

    let flags = tables.get_memory_flags(virt).expect("flags");
    kernel_assert!(flags.contains(PageFlags::WRITABLE));
}
