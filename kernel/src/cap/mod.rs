//! Kernel object and handle model.
//!
//! Every kernel-managed resource a process can refer to — process, thread,
//! mutex, event, VFS node, device, address space, transaction — is a
//! [`KernelObject`] behind an RCU-managed `RcuShared`. Processes never see
//! raw pointers to objects; they see [`Handle`] values, opaque 64-bit
//! tokens resolved through a process's [`HandleTable`] (or, for objects not
//! yet bound to any process, the global [`SystemObjects`] registry).
//!
//! Grounded on the teacher's `cap::token::CapabilityToken` packed-integer
//! idiom and `cap::types::CapabilitySpace`'s `BTreeMap`-behind-a-lock
//! storage, generalized: a `Handle` here carries only `{type, id}`, not
//! capability-style access flags — [`AccessMask`] on the table entry
//! carries those instead, so the same object can be held with different
//! rights by different processes' handle tables.

pub mod handle;
pub mod object;
pub mod registry;
pub mod sync_objects;
pub mod table;
pub mod transaction;

pub use handle::{Handle, ObjectType, OS_HANDLE_INVALID};
pub use object::{KernelObject, ObjectName, ObjectRefCounts};
pub use registry::SystemObjects;
pub use sync_objects::{KernelEvent, KernelMutex};
pub use table::{AccessMask, HandleTable};
pub use transaction::Transaction;

/// Bring up the global object registry. Must run before any call to
/// `registry::register`.
pub fn init() {
    registry::init();
    log::info!("cap: system object registry online");
}
