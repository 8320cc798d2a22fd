//! Multi-stage kernel initialization.
//!
//! Brings up each subsystem in dependency order (spec §2): intrinsics are
//! ambient, so bootstrap starts from architecture init, then the physical
//! and virtual memory managers, then capabilities/process/VFS, then the
//! scheduler and interrupt-vector table, finishing with the idle loop.
//! Grounded on the teacher's `bootstrap::kernel_init`/`run` two-phase split
//! and its `define_bootstrap_stages!` per-architecture progress-print
//! macro, with every subsystem call rebound to this kernel's real module
//! set and the dead phase3-6 subsystems (security/perf/ipc/pkg/net/graphics/
//! services/userspace) removed.

use crate::{
    arch, cap,
    fs,
    mm::{self, frame_allocator::{BootMemoryRegion, BootRegionKind}, PhysicalAddress},
    process, sched,
};

#[cfg(feature = "alloc")]
extern crate alloc;

/// Macro to generate the 6 bootstrap stage tracking functions.
///
/// Each architecture provides its own `$print_fn` macro that accepts a
/// single string literal and outputs it (with a trailing newline) to the
/// architecture's early console, eliminating the otherwise-identical stage
/// function bodies duplicated per architecture.
#[macro_export]
macro_rules! define_bootstrap_stages {
    ($print_fn:ident) => {
        pub fn stage1_start() {
            $print_fn!("[BOOTSTRAP] Stage 1: Architecture initialization");
        }
        pub fn stage1_complete() {
            $print_fn!("[BOOTSTRAP] Architecture initialized");
        }
        pub fn stage2_start() {
            $print_fn!("[BOOTSTRAP] Stage 2: Memory management");
        }
        pub fn stage2_complete() {
            $print_fn!("[BOOTSTRAP] Memory management initialized");
        }
        pub fn stage3_start() {
            $print_fn!("[BOOTSTRAP] Stage 3: Capabilities, VFS, process table");
        }
        pub fn stage3_complete() {
            $print_fn!("[BOOTSTRAP] Capabilities, VFS, process table initialized");
        }
        pub fn stage4_start() {
            $print_fn!("[BOOTSTRAP] Stage 4: Interrupt vectors");
        }
        pub fn stage4_complete() {
            $print_fn!("[BOOTSTRAP] Interrupt vectors initialized");
        }
        pub fn stage5_start() {
            $print_fn!("[BOOTSTRAP] Stage 5: Scheduler activation");
        }
        pub fn stage5_complete() {
            $print_fn!("[BOOTSTRAP] Scheduler activated - entering main loop");
        }
    };
}

/// Raw memory region as handed to us across the boot-loader boundary: a
/// half-open physical range tagged usable/reclaimable/reserved. Building
/// the normalized [`BootMemoryRegion`] list from this is the one piece of
/// boot-context translation this kernel owns (spec §2 item 2); everything
/// upstream of it (the boot-loader itself) is an external collaborator.
pub struct RawMemoryRegion {
    pub start: u64,
    pub end: u64,
    pub kind: BootRegionKind,
}

fn normalize_memory_map(raw: &[RawMemoryRegion]) -> alloc::vec::Vec<BootMemoryRegion> {
    raw.iter()
        .map(|r| BootMemoryRegion {
            start: PhysicalAddress::new(r.start),
            end: PhysicalAddress::new(r.end),
            kind: r.kind,
        })
        .collect()
}

/// Multi-stage kernel initialization, given the boot-loader's raw memory
/// map. Returns once every subsystem is up; the caller is responsible for
/// handing control to [`sched::run`].
pub fn kernel_init(raw_memory_map: &[RawMemoryRegion]) {
    crate::log_service::log_init();
    crate::log_service::install_log_bridge(log::LevelFilter::Info);

    arch::x86_64::bootstrap::stage1_start();
    arch::init();
    arch::x86_64::bootstrap::stage1_complete();

    arch::x86_64::bootstrap::stage2_start();
    let regions = normalize_memory_map(raw_memory_map);
    mm::init(&regions);
    // Snapshot the page tables the boot-loader handed us so every later
    // process creation can share its higher-half mappings (spec §4.7 step 4).
    #[cfg(target_arch = "x86_64")]
    mm::set_system_page_tables(mm::PageTables::current());
    arch::x86_64::bootstrap::stage2_complete();

    arch::x86_64::bootstrap::stage3_start();
    cap::init();
    process::init();
    fs::init();
    arch::x86_64::bootstrap::stage3_complete();

    arch::x86_64::bootstrap::stage4_start();
    crate::irq::init();
    arch::x86_64::bootstrap::stage4_complete();

    arch::x86_64::bootstrap::stage5_start();
    sched::init();
    arch::x86_64::bootstrap::stage5_complete();
}

/// Run the full bootstrap sequence and hand off to the scheduler. Never
/// returns.
pub fn run(raw_memory_map: &[RawMemoryRegion]) -> ! {
    kernel_init(raw_memory_map);
    log::info!("bootstrap: boot sequence complete");
    sched::run();
}
