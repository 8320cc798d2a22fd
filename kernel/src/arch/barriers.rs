//! Memory barrier abstractions.
//!
//! Centralizes memory barrier/fence operations behind names that describe
//! intent rather than the underlying instruction, so call sites read as
//! "what ordering do I need" rather than "which fence mnemonic is this".
//!
//! # Barrier types
//!
//! * [`memory_fence`] -- full read/write fence (strongest).
//! * [`data_sync_barrier`] -- data synchronization barrier; same as
//!   [`memory_fence`] on x86_64's strongly ordered model.
//! * [`instruction_sync_barrier`] -- instruction stream synchronization;
//!   a no-op on x86_64.

/// Full memory fence -- all reads and writes issued before this barrier are
/// globally visible before any reads or writes issued after it.
///
/// x86_64: `core::sync::atomic::fence(SeqCst)` -- MFENCE semantics.
#[inline(always)]
pub fn memory_fence() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

/// Data synchronization barrier with instruction synchronization.
///
/// On x86_64 this is equivalent to [`memory_fence`] because the memory
/// model already guarantees the necessary ordering.
#[inline(always)]
pub fn data_sync_barrier() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

/// Instruction synchronization barrier.
///
/// x86_64's strongly ordered model and unified instruction/data view make
/// an explicit instruction barrier unnecessary; kept as a named no-op so
/// call sites stay architecture-agnostic in intent.
#[inline(always)]
pub fn instruction_sync_barrier() {}
