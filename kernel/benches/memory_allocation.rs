//! Memory allocation benchmark
//!
//! Measures physical frame allocation/free and virtual range
//! reservation/release throughput.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]

extern crate alloc;

use core::panic::PanicInfo;

use veridian_kernel::{
    bench::BenchmarkResult,
    benchmark,
    mm::{frame_allocator, VirtualAllocator},
    serial_println,
};

const FRAME_ALLOC_TARGET_NS: u64 = 5_000;
const ITERATIONS: u64 = 1000;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    veridian_kernel::arch::init();

    serial_println!("Memory Allocation Benchmark");
    serial_println!("===========================");
    serial_println!("Target: < {} ns", FRAME_ALLOC_TARGET_NS);
    serial_println!();

    let frame_result = benchmark_frame_alloc_free();
    let virt_result = benchmark_virt_alloc_free();

    serial_println!("\nResults:");
    serial_println!("--------");
    print_result("Frame alloc/free", &frame_result);
    print_result("Virtual range alloc/release", &virt_result);

    serial_println!("\nTarget Analysis:");
    serial_println!("----------------");
    check_target("Frame alloc/free", &frame_result, FRAME_ALLOC_TARGET_NS);

    veridian_kernel::exit_qemu(veridian_kernel::QemuExitCode::Success);
}

fn benchmark_frame_alloc_free() -> BenchmarkResult {
    benchmark!("Frame Alloc/Free", ITERATIONS, {
        let frame = frame_allocator::allocate_frame().expect("allocate_frame");
        unsafe { frame_allocator::deallocate_frame(frame) };
    })
}

fn benchmark_virt_alloc_free() -> BenchmarkResult {
    let allocator = VirtualAllocator::new_user(256 * 1024 * 1024);
    benchmark!("Virtual Alloc/Release", ITERATIONS, {
        let range = allocator.alloc4k(1).expect("alloc4k");
        allocator.release4k(range, 1);
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
