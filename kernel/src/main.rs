//! Kernel binary entry point.
//!
//! Thin shell around [`veridian_kernel`]: receives the boot-loader's memory
//! map through `bootloader_api`, normalizes it into [`RawMemoryRegion`]s,
//! and hands off to [`bootstrap::run`]. All real subsystem wiring lives in
//! the library crate so it is exercised the same way by `#[cfg(test)]`
//! unit tests and by the booted kernel.

#![no_std]
#![no_main]

extern crate alloc;

use bootloader_api::{entry_point, info::MemoryRegionKind, BootInfo};
use veridian_kernel::{
    arch,
    bootstrap::{self, RawMemoryRegion},
    mm::frame_allocator::BootRegionKind,
    println,
};

entry_point!(kernel_main);

/// The bootloader only distinguishes usable / bootloader-owned / unknown
/// firmware memory; it never reports ACPI-reclaimable or known-bad ranges
/// separately; those two richer `BootRegionKind` members are reachable
/// only from a platform with ACPI table parsing wired in front of this
/// translation (spec's explicitly out-of-scope boot-loader handover).
fn classify(kind: MemoryRegionKind) -> BootRegionKind {
    match kind {
        MemoryRegionKind::Usable => BootRegionKind::Usable,
        MemoryRegionKind::Bootloader => BootRegionKind::BootloaderReclaimable,
        _ => BootRegionKind::Reserved,
    }
}

fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    arch::x86_64::entry::arch_early_init();

    println!("veridian-kernel v{}", env!("CARGO_PKG_VERSION"));
    println!("initializing microkernel...");

    let regions: alloc::vec::Vec<RawMemoryRegion> = boot_info
        .memory_regions
        .iter()
        .map(|r| RawMemoryRegion {
            start: r.start,
            end: r.end,
            kind: classify(r.kind),
        })
        .collect();

    bootstrap::run(&regions);
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    arch::x86_64::entry::arch_panic_handler(info);
    arch::halt();
}
