//! Shared setup for the `harness = false` integration-test binaries.
//!
//! Each binary below boots a minimal slice of the kernel inside QEMU rather
//! than running under `cargo test`'s host harness, so setup means bringing
//! up exactly the subsystems that binary's scenario touches.

use veridian_kernel::{cap, fs, mm::frame_allocator::BootMemoryRegion, process, sched, serial_println};

/// Memory map handed to [`veridian_kernel::mm::init`] when a test needs a
/// frame allocator but is not running under the real boot loader. 64 MiB
/// starting at 1 MiB mirrors the low region every x86_64 boot loader
/// reports as usable.
pub fn test_memory_map() -> [BootMemoryRegion; 1] {
    use veridian_kernel::mm::{frame_allocator::BootRegionKind, PhysicalAddress};
    [BootMemoryRegion {
        start: PhysicalAddress::new(0x10_0000),
        end: PhysicalAddress::new(0x10_0000 + 64 * 1024 * 1024),
        kind: BootRegionKind::Usable,
    }]
}

/// Bring up every subsystem a cross-subsystem test binary might touch, in
/// the same order `bootstrap::run` does. Idempotent enough to call once per
/// binary's `_start`.
pub fn init_test_env(suite: &str) {
    serial_println!("\n=== {} ===", suite);
    veridian_kernel::mm::init(&test_memory_map());
    cap::init();
    fs::init();
    process::table::init();
    process::thread::init();
    sched::init();
}
