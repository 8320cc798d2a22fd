//! Context switch benchmark
//!
//! Measures the time for the scheduler to pick up a runnable thread versus
//! the time for a bare logical register save/restore, so a regression in
//! the runnable-queue path shows up against the register-shuffle floor.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]

extern crate alloc;

use core::panic::PanicInfo;

use veridian_kernel::{
    bench::BenchmarkResult,
    benchmark,
    process::{self, ProcessId},
    sched::{queue, scheduler},
    serial_println,
};

const CONTEXT_SWITCH_TARGET_NS: u64 = 10_000;
const ITERATIONS: u64 = 1000;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    veridian_kernel::arch::init();
    process::thread::init();

    serial_println!("Context Switch Benchmark");
    serial_println!("========================");
    serial_println!("Target: < {} ns", CONTEXT_SWITCH_TARGET_NS);
    serial_println!();

    let register_save_result = benchmark_register_save_restore();
    let enqueue_result = benchmark_enqueue_dequeue();

    serial_println!("\nResults:");
    serial_println!("--------");
    print_result("Register save/restore", &register_save_result);
    print_result("Runnable queue enqueue/dequeue", &enqueue_result);

    serial_println!("\nTarget Analysis:");
    serial_println!("----------------");
    check_target("Register save/restore", &register_save_result, CONTEXT_SWITCH_TARGET_NS);
    check_target("Enqueue/dequeue", &enqueue_result, CONTEXT_SWITCH_TARGET_NS);

    veridian_kernel::exit_qemu(veridian_kernel::QemuExitCode::Success);
}

fn benchmark_register_save_restore() -> BenchmarkResult {
    benchmark!("Register Save/Restore", ITERATIONS, {
        unsafe {
            core::arch::asm!(
                "push rax",
                "push rbx",
                "push rcx",
                "push rdx",
                "push rsi",
                "push rdi",
                "push rbp",
                "push r8",
                "push r9",
                "push r10",
                "push r11",
                "push r12",
                "push r13",
                "push r14",
                "push r15",
                "mov rax, 0xDEADBEEF",
                "pop r15",
                "pop r14",
                "pop r13",
                "pop r12",
                "pop r11",
                "pop r10",
                "pop r9",
                "pop r8",
                "pop rbp",
                "pop rdi",
                "pop rsi",
                "pop rdx",
                "pop rcx",
                "pop rbx",
                "pop rax",
                out("rax") _,
            );
        }
    })
}

fn benchmark_enqueue_dequeue() -> BenchmarkResult {
    let (thread, _handle) =
        process::thread::spawn(ProcessId(1), 0xffff_8000_0040_0000, 0x1000, 0x7fff_0000)
            .expect("spawn benchmark thread");
    let tid = thread.tid();

    benchmark!("Enqueue/Dequeue", ITERATIONS, {
        scheduler::enqueue(tid);
        let _ = queue::get_work_item();
        thread.schedule_state().set(process::ScheduleState::Ready);
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
