//! Process syscall group (`0x30-0x34`): the six-step process creation
//! sequence from spec §4.7, plus exit/wait/reap/info.

use crate::{
    cap::AccessMask,
    error::{KernelError, KernelResult},
    process::{self as kprocess, process::ProcessHandle, WaitTimeout},
};

use super::{checked_handle, from_result, from_unit_result, handle::decode_timeout, SyscallReturn};

/// `OS_PROCESS_CREATE(name_ptr, name_len)`: spawn a child of the calling
/// process and bind the new process's handle into the caller's own handle
/// table with full rights.
pub fn sys_process_create(name_ptr: u64, name_len: u64) -> SyscallReturn {
    from_result(create(name_ptr, name_len))
}

fn create(name_ptr: u64, name_len: u64) -> KernelResult<u64> {
    if name_ptr == 0 || name_len == 0 || name_len > 32 {
        return Err(KernelError::InvalidArgument {
            name: "name_len",
            value: "must be 1..=32 bytes",
        });
    }
    // SAFETY: name_ptr/name_len name a buffer in the calling process's own
    // mapped address space, per the syscall ABI's pointer-argument contract.
    let name_bytes = unsafe { core::slice::from_raw_parts(name_ptr as *const u8, name_len as usize) };
    let name = core::str::from_utf8(name_bytes).map_err(|_| KernelError::InvalidArgument {
        name: "name",
        value: "not valid UTF-8",
    })?;

    let current = kprocess::current_process()?;
    let (_child_pid, handle) = kprocess::process::spawn(current.pid(), name)?;
    current.handles().insert(handle, AccessMask::all())?;
    Ok(handle.as_u64())
}

/// `OS_PROCESS_EXIT(code)`: mark the calling process a zombie. Threads are
/// left for the scheduler to reap, matching `Process::exit`'s contract.
pub fn sys_process_exit(code: u64) -> SyscallReturn {
    from_unit_result(exit(code))
}

fn exit(code: u64) -> KernelResult<()> {
    let current = kprocess::current_process()?;
    current.exit(code as i32);
    Ok(())
}

/// `OS_PROCESS_WAIT(handle, timeout_ms)`: block until the named process
/// reaches `Zombie`/`Dead` or the deadline passes.
pub fn sys_process_wait(raw_handle: u64, timeout_ms: u64) -> SyscallReturn {
    from_unit_result(wait(raw_handle, timeout_ms))
}

fn wait(raw_handle: u64, timeout_ms: u64) -> KernelResult<()> {
    let handle = checked_handle(raw_handle)?;
    let timeout: WaitTimeout = decode_timeout(timeout_ms);
    kprocess::wait_on_handle(handle, timeout)
}

/// `OS_PROCESS_REAP(handle)`: tear down a zombie process's process-table
/// entry. The handle itself is unaffected; close it separately.
pub fn sys_process_reap(raw_handle: u64) -> SyscallReturn {
    from_unit_result(reap(raw_handle))
}

fn reap(raw_handle: u64) -> KernelResult<()> {
    let handle = checked_handle(raw_handle)?;
    let current = kprocess::current_process()?;
    let object = current.handles().get(handle, AccessMask::DELETE)?;
    let process_handle = object
        .as_any()
        .downcast_ref::<ProcessHandle>()
        .ok_or(KernelError::InvalidHandle { handle: raw_handle })?;
    kprocess::process::reap(process_handle.process().pid())
}

/// `OS_PROCESS_GET_INFO(handle)`: pack `{state: u8, exit_code: i32}` into
/// the syscall's `value` word — state in the low byte, the exit code's
/// bit pattern in bits 8..40.
pub fn sys_process_get_info(raw_handle: u64) -> SyscallReturn {
    from_result(get_info(raw_handle))
}

fn get_info(raw_handle: u64) -> KernelResult<u64> {
    let handle = checked_handle(raw_handle)?;
    let current = kprocess::current_process()?;
    let object = current.handles().get(handle, AccessMask::READ)?;
    let process_handle = object
        .as_any()
        .downcast_ref::<ProcessHandle>()
        .ok_or(KernelError::InvalidHandle { handle: raw_handle })?;
    let process = process_handle.process();
    let state = process.state() as u64;
    let exit_code = process.exit_code() as u32 as u64;
    Ok(state | (exit_code << 8))
}
