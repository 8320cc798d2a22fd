//! Per-CPU interrupt vector table (spec §4.8).
//!
//! Grounded on the teacher's `irq` module's allocate/free-vector shape,
//! re-scoped from an architecture-independent, heap-backed handler map
//! keyed by a generic `IrqNumber` down to the raw 256-entry x86_64 vector
//! table the kernel data model describes: each CPU owns a fixed
//! `[Option<IsrHandler>; 256]` array and hands out the lowest free vector
//! on request. Mutated only by the CPU it belongs to (spec §5), so no
//! cross-CPU locking is needed on the allocate/free path; the fixed-size
//! array mirrors [`crate::sched::smp::PER_CPU`]'s per-CPU-state shape.

use crate::{
    error::{KernelError, KernelResult},
    sched::smp::{current_cpu_id, MAX_CPUS},
};

/// Number of entries in a local ISR table (matches the x86_64 IDT size).
pub const ISR_TABLE_LEN: usize = 256;

/// Vectors below this are reserved for CPU exception handlers wired by
/// [`crate::arch::x86_64::idt`]; `allocate` never hands one out.
const FIRST_ALLOCATABLE_VECTOR: usize = 32;

/// A zero-argument interrupt handler, invoked with interrupts disabled.
pub type IsrHandler = fn();

/// A reference to an entry allocated in a [`LocalIsrTable`]. Opaque outside
/// this module except for the underlying vector number, which the caller
/// needs to program into the IDT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsrEntry {
    vector: u8,
}

impl IsrEntry {
    /// The IDT vector this entry occupies.
    pub fn vector(self) -> u8 {
        self.vector
    }
}

/// Per-CPU table of 256 interrupt vector slots.
pub struct LocalIsrTable {
    handlers: [Option<IsrHandler>; ISR_TABLE_LEN],
}

impl LocalIsrTable {
    const fn new() -> Self {
        Self {
            handlers: [None; ISR_TABLE_LEN],
        }
    }

    /// Install `handler` at the lowest free vector at or above
    /// [`FIRST_ALLOCATABLE_VECTOR`], returning an entry reference.
    pub fn allocate(&mut self, handler: IsrHandler) -> KernelResult<IsrEntry> {
        for vector in FIRST_ALLOCATABLE_VECTOR..ISR_TABLE_LEN {
            if self.handlers[vector].is_none() {
                self.handlers[vector] = Some(handler);
                return Ok(IsrEntry {
                    vector: vector as u8,
                });
            }
        }
        Err(KernelError::ResourceExhausted {
            resource: "ISR vector",
        })
    }

    /// Remove the handler at `entry`, returning the freed vector number.
    pub fn free(&mut self, entry: IsrEntry) -> u8 {
        self.handlers[entry.vector as usize] = None;
        entry.vector
    }

    /// Invoke the handler registered for `vector`, if any. Unregistered
    /// (spurious) vectors are silently ignored.
    pub fn dispatch(&self, vector: u8) {
        if let Some(handler) = self.handlers[vector as usize] {
            handler();
        }
    }

    /// Whether `vector` currently has a handler installed.
    pub fn is_allocated(&self, vector: u8) -> bool {
        self.handlers[vector as usize].is_some()
    }
}

static mut PER_CPU_TABLES: [LocalIsrTable; MAX_CPUS] = {
    const INIT: LocalIsrTable = LocalIsrTable::new();
    [INIT; MAX_CPUS]
};

/// Borrow this CPU's [`LocalIsrTable`] for the duration of `f`.
///
/// # Safety invariant
///
/// Each CPU only ever calls this with its own `current_cpu_id()` index, so
/// no two CPUs observe the same slot concurrently; the `static mut` below
/// is therefore accessed without a lock, matching spec §5's "mutated only
/// by the CPU it belongs to".
pub fn with_local_table<R>(f: impl FnOnce(&mut LocalIsrTable) -> R) -> R {
    let id = (current_cpu_id() as usize) % MAX_CPUS;
    // SAFETY: each CPU indexes only its own slot (id derived from this
    // CPU's APIC id), so concurrent CPUs never alias the same element.
    let table = unsafe { &mut *core::ptr::addr_of_mut!(PER_CPU_TABLES[id]) };
    f(table)
}

/// Initialize the interrupt subsystem. A no-op beyond confirming the
/// per-CPU tables exist; each CPU's table starts empty and is populated by
/// [`with_local_table`] callers as handlers are registered.
pub fn init() {
    log::info!("irq: local ISR table ready for cpu {}", current_cpu_id());
}

/// Install `handler` at the lowest free vector on this CPU.
pub fn allocate(handler: IsrHandler) -> KernelResult<IsrEntry> {
    with_local_table(|table| table.allocate(handler))
}

/// Free a previously allocated entry on this CPU, returning its vector.
pub fn free(entry: IsrEntry) -> u8 {
    with_local_table(|table| table.free(entry))
}

/// Dispatch `vector` on this CPU's table. Called from the architecture's
/// generic interrupt entry stub.
pub fn dispatch(vector: u8) {
    with_local_table(|table| table.dispatch(vector));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() {}

    #[test]
    fn allocate_picks_lowest_free_vector() {
        let mut table = LocalIsrTable::new();
        let entry = table.allocate(noop).unwrap();
        assert_eq!(entry.vector(), FIRST_ALLOCATABLE_VECTOR as u8);
    }

    #[test]
    fn free_reopens_the_vector() {
        let mut table = LocalIsrTable::new();
        let first = table.allocate(noop).unwrap();
        let second = table.allocate(noop).unwrap();
        assert_ne!(first.vector(), second.vector());

        let freed = table.free(first);
        assert_eq!(freed, FIRST_ALLOCATABLE_VECTOR as u8);
        assert!(!table.is_allocated(freed));

        let reused = table.allocate(noop).unwrap();
        assert_eq!(reused.vector(), freed);
    }

    #[test]
    fn exhausting_all_vectors_reports_resource_exhausted() {
        let mut table = LocalIsrTable::new();
        for _ in FIRST_ALLOCATABLE_VECTOR..ISR_TABLE_LEN {
            table.allocate(noop).unwrap();
        }
        assert!(matches!(
            table.allocate(noop),
            Err(KernelError::ResourceExhausted { .. })
        ));
    }

    #[test]
    fn dispatch_ignores_unregistered_vector() {
        let table = LocalIsrTable::new();
        table.dispatch(200);
    }
}
