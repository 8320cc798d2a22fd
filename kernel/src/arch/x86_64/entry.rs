//! x86_64 kernel entry point and panic handler.
//!
//! Grounded on the teacher's `arch::x86_64::entry` module: disable
//! interrupts before anything else runs, bring up the early serial sink so
//! diagnostics are available before the structured logger exists, then hand
//! off to [`crate::bootstrap::run`].

use core::panic::PanicInfo;

use crate::{early_println, println};

/// Earliest-possible architecture setup, run before any subsystem init.
pub fn arch_early_init() {
    // SAFETY: cli is the first instruction executed; no interrupt handler
    // is installed yet, so disabling interrupts here cannot race anything.
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack));
    }

    crate::arch::x86_64::early_serial::init();
    early_println!("[EARLY] x86_64 entry reached");
    early_println!("[EARLY] kernel v{}", env!("CARGO_PKG_VERSION"));
    early_println!("[EARLY] architecture: x86_64");
}

/// Architecture-specific panic reporting, called from the kernel panic
/// handler before halting.
pub fn arch_panic_handler(info: &PanicInfo) {
    println!("[KERNEL PANIC] {}", info);
}
