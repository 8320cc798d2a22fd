//! Page table mapping benchmark
//!
//! Measures the cost of a single `map`/`unmap` round trip against a fresh
//! address space, the operation a page fault handler or `mmap`-style
//! syscall drives on every backing-store fault.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]

extern crate alloc;

use core::panic::PanicInfo;

use veridian_kernel::{
    bench::BenchmarkResult,
    benchmark,
    mm::{frame_allocator, MemoryRange, PageFlags, PageTables, VirtualAddress},
    serial_println,
};

const MAP_TARGET_NS: u64 = 5_000;
const ITERATIONS: u64 = 1000;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    veridian_kernel::arch::init();

    serial_println!("Page Table Mapping Benchmark");
    serial_println!("============================");
    serial_println!("Target: < {} ns", MAP_TARGET_NS);
    serial_println!();

    let result = benchmark_map_unmap();

    serial_println!("\nResults:");
    serial_println!("--------");
    print_result("Map/Unmap one page", &result);

    serial_println!("\nTarget Analysis:");
    serial_println!("----------------");
    check_target("Map/Unmap one page", &result, MAP_TARGET_NS);

    veridian_kernel::exit_qemu(veridian_kernel::QemuExitCode::Success);
}

fn benchmark_map_unmap() -> BenchmarkResult {
    let tables = PageTables::new(8).expect("page tables");
    let virt = VirtualAddress::new(0x3000_0000);

    benchmark!("Map/Unmap", ITERATIONS, {
        let frame = frame_allocator::allocate_frame().expect("allocate_frame");
        tables
            .map(frame.number().as_addr(), virt, 0x1000, PageFlags::PRESENT | PageFlags::WRITABLE)
            .expect("map");
        tables.unmap(MemoryRange::new_virt(virt, VirtualAddress::new(virt.as_u64() + 0x1000)));
        unsafe { frame_allocator::deallocate_frame(frame) };
    })
}

fn print_result(name: &str, result: &BenchmarkResult) {
    serial_println!(
        "{:<30} Avg: {:>6} ns, Min: {:>6} ns, Max: {:>6} ns",
        name,
        result.avg_time_ns,
        result.min_time_ns,
        result.max_time_ns
    );
}

fn check_target(name: &str, result: &BenchmarkResult, target_ns: u64) {
    if result.meets_target(target_ns) {
        serial_println!("{:<30} PASS ({}ns < {}ns)", name, result.avg_time_ns, target_ns);
    } else {
        serial_println!("{:<30} FAIL ({}ns > {}ns)", name, result.avg_time_ns, target_ns);
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_println!("Benchmark panic: {}", info);
    veridian_kernel::exit_qemu(veridian_kernel::QemuExitCode::Failed)
}
