//! `Transaction` kernel object (spec §3, §6 `transaction` syscall group).
//!
//! spec.md names `Transaction` among the kernel object types and reserves
//! syscall IDs `0x60-0x63` for it but does not otherwise describe its
//! semantics; `original_source/` has no surviving transaction manager
//! either. Modeled as the minimal object that gives those four syscalls
//! (begin/commit/abort/status) distinct, non-overlapping behavior: a
//! one-shot state machine `Active -> {Committed, Aborted}`, grounded in the
//! same atomic-state-plus-`ObjectRefCounts` shape as [`super::KernelMutex`]
//! and [`super::KernelEvent`].

use core::sync::atomic::{AtomicU8, Ordering};

use super::{
    handle::ObjectType,
    object::{KernelObject, ObjectName, ObjectRefCounts},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionState {
    Active = 0,
    Committed = 1,
    Aborted = 2,
}

impl TransactionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Active,
            1 => Self::Committed,
            _ => Self::Aborted,
        }
    }
}

pub struct Transaction {
    state: AtomicU8,
    name: Option<ObjectName>,
    counts: ObjectRefCounts,
}

impl Transaction {
    pub fn new(name: Option<ObjectName>) -> Self {
        Self {
            state: AtomicU8::new(TransactionState::Active as u8),
            name,
            counts: ObjectRefCounts::new(),
        }
    }

    pub fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Active -> Committed`. Fails if the transaction already finished.
    pub fn commit(&self) -> bool {
        self.state
            .compare_exchange(
                TransactionState::Active as u8,
                TransactionState::Committed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `Active -> Aborted`. Fails if the transaction already finished.
    pub fn abort(&self) -> bool {
        self.state
            .compare_exchange(
                TransactionState::Active as u8,
                TransactionState::Aborted as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl KernelObject for Transaction {
    fn object_type(&self) -> ObjectType {
        ObjectType::Transaction
    }

    fn name(&self) -> Option<&ObjectName> {
        self.name.as_ref()
    }

    fn ref_counts(&self) -> &ObjectRefCounts {
        &self.counts
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_succeeds_exactly_once() {
        let tx = Transaction::new(None);
        assert!(tx.commit());
        assert_eq!(tx.state(), TransactionState::Committed);
        assert!(!tx.commit());
        assert!(!tx.abort());
    }

    #[test]
    fn abort_succeeds_exactly_once() {
        let tx = Transaction::new(None);
        assert!(tx.abort());
        assert_eq!(tx.state(), TransactionState::Aborted);
        assert!(!tx.abort());
        assert!(!tx.commit());
    }
}
