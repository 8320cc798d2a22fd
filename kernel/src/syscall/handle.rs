//! Handle syscall group (`0x01-0x04`): operations meaningful for any
//! handle regardless of the object type behind it.

use crate::{
    cap::{registry, AccessMask, Handle},
    error::{KernelError, KernelResult},
    process::{self, WaitTimeout},
};

use super::{checked_handle, from_result, from_unit_result, SyscallReturn};

/// `OS_HANDLE_CLOSE(handle)`: remove `handle` from the calling process's
/// handle table. Does not affect other processes' tables or the global
/// registry entry (spec §4.5 "closing the last handle does not by itself
/// delete the node").
pub fn sys_handle_close(raw_handle: u64) -> SyscallReturn {
    from_unit_result(close(raw_handle))
}

fn close(raw_handle: u64) -> KernelResult<()> {
    let handle = checked_handle(raw_handle)?;
    let current = process::current_process()?;
    current.handles().close(handle)
}

/// `OS_HANDLE_DUPLICATE(handle, rights)`: bind the same underlying object
/// into the calling process's handle table a second time, with at most the
/// rights the original entry already carried.
pub fn sys_handle_duplicate(raw_handle: u64, rights: u64) -> SyscallReturn {
    from_result(duplicate(raw_handle, rights))
}

fn duplicate(raw_handle: u64, rights: u64) -> KernelResult<u64> {
    let handle = checked_handle(raw_handle)?;
    let requested = AccessMask::from_bits_truncate(rights as u32);
    let current = process::current_process()?;
    current.handles().get(handle, requested)?;
    current.handles().insert(handle, requested)?;
    Ok(handle.as_u64())
}

/// `OS_HANDLE_WAIT(handle, timeout_ms)`: `Thread.waitOnHandle` (spec §4.7).
/// `timeout_ms == u64::MAX` means `OS_TIMEOUT_INFINITE`; `0` means poll
/// once.
pub fn sys_handle_wait(raw_handle: u64, timeout_ms: u64) -> SyscallReturn {
    from_unit_result(wait(raw_handle, timeout_ms))
}

fn wait(raw_handle: u64, timeout_ms: u64) -> KernelResult<()> {
    let handle = checked_handle(raw_handle)?;
    let timeout = decode_timeout(timeout_ms);
    process::wait_on_handle(handle, timeout)
}

pub(crate) fn decode_timeout(timeout_ms: u64) -> WaitTimeout {
    match timeout_ms {
        u64::MAX => WaitTimeout::Infinite,
        0 => WaitTimeout::Poll,
        ms => WaitTimeout::Deadline(crate::timer::get_uptime_ms().saturating_add(ms)),
    }
}

/// `OS_HANDLE_GET_TYPE(handle)`: the handle's high-byte object type tag.
pub fn sys_handle_get_type(raw_handle: u64) -> SyscallReturn {
    from_result(get_type(raw_handle))
}

fn get_type(raw_handle: u64) -> KernelResult<u64> {
    let handle = checked_handle(raw_handle)?;
    registry::lookup(handle)?;
    let object_type = handle
        .object_type()
        .ok_or(KernelError::InvalidHandle { handle: raw_handle })?;
    Ok(object_type as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_timeout_never_expires() {
        assert_eq!(decode_timeout(u64::MAX), WaitTimeout::Infinite);
    }

    #[test]
    fn zero_timeout_is_a_single_poll() {
        assert_eq!(decode_timeout(0), WaitTimeout::Poll);
    }
}
