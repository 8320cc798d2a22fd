//! Node syscall group (`0x16-0x19`): VFS node open/read/write/stat, the
//! `Stream` interface from spec §4.5 exposed across the syscall boundary.

use crate::{
    cap::AccessMask,
    error::{KernelError, KernelResult},
    fs,
    process,
};

use super::{checked_handle, from_result, SyscallReturn};

/// Copy `len` bytes out of the calling process's own address space at
/// `ptr`. Syscalls run with the caller's page tables still installed (this
/// kernel performs no address-space swap on syscall entry), so the pointer
/// is dereferenced directly rather than copied in through an indirection
/// layer.
unsafe fn user_slice<'a>(ptr: u64, len: u64) -> &'a [u8] {
    core::slice::from_raw_parts(ptr as *const u8, len as usize)
}

unsafe fn user_slice_mut<'a>(ptr: u64, len: u64) -> &'a mut [u8] {
    core::slice::from_raw_parts_mut(ptr as *mut u8, len as usize)
}

/// `OS_NODE_OPEN(path_ptr, path_len)`: resolve a NUL-segment path and bind
/// the resulting node as a fresh handle in the calling process's handle
/// table with full rights.
pub fn sys_node_open(path_ptr: u64, path_len: u64) -> SyscallReturn {
    from_result(open(path_ptr, path_len))
}

fn open(path_ptr: u64, path_len: u64) -> KernelResult<u64> {
    if path_ptr == 0 {
        return Err(KernelError::InvalidArgument {
            name: "path_ptr",
            value: "null",
        });
    }
    // SAFETY: path_ptr/path_len name a buffer in the calling process's own
    // mapped address space, per the syscall ABI's pointer-argument contract.
    let path_text = unsafe { user_slice(path_ptr, path_len) };
    let handle = fs::open(path_text)?;
    let current = process::current_process()?;
    current.handles().insert(handle, AccessMask::all())?;
    Ok(handle.as_u64())
}

/// `OS_NODE_READ(handle, offset, buf_ptr, buf_len)`.
pub fn sys_node_read(raw_handle: u64, offset: u64, buf_ptr: u64, buf_len: u64) -> SyscallReturn {
    from_result(read(raw_handle, offset, buf_ptr, buf_len))
}

fn read(raw_handle: u64, offset: u64, buf_ptr: u64, buf_len: u64) -> KernelResult<u64> {
    let handle = checked_handle(raw_handle)?;
    let current = process::current_process()?;
    let object = current.handles().get(handle, AccessMask::READ)?;
    let node_handle = object
        .as_any()
        .downcast_ref::<fs::VfsNodeHandle>()
        .ok_or(KernelError::InvalidHandle { handle: raw_handle })?;
    // SAFETY: see `user_slice`.
    let buf = unsafe { user_slice_mut(buf_ptr, buf_len) };
    let bytes = node_handle.node().read(offset, buf)?;
    Ok(bytes as u64)
}

/// `OS_NODE_WRITE(handle, offset, buf_ptr, buf_len)`.
pub fn sys_node_write(raw_handle: u64, offset: u64, buf_ptr: u64, buf_len: u64) -> SyscallReturn {
    from_result(write(raw_handle, offset, buf_ptr, buf_len))
}

fn write(raw_handle: u64, offset: u64, buf_ptr: u64, buf_len: u64) -> KernelResult<u64> {
    let handle = checked_handle(raw_handle)?;
    let current = process::current_process()?;
    let object = current.handles().get(handle, AccessMask::WRITE)?;
    let node_handle = object
        .as_any()
        .downcast_ref::<fs::VfsNodeHandle>()
        .ok_or(KernelError::InvalidHandle { handle: raw_handle })?;
    // SAFETY: see `user_slice`.
    let data = unsafe { user_slice(buf_ptr, buf_len) };
    let bytes = node_handle.node().write(offset, data)?;
    Ok(bytes as u64)
}

/// `OS_NODE_STAT(handle, out_ptr)`: writes the node's stream size (8 bytes,
/// native endianness) to `out_ptr`. Folder/device nodes, which do not
/// support the `Stream` interface, report `InterfaceNotSupported`.
pub fn sys_node_stat(raw_handle: u64, out_ptr: u64) -> SyscallReturn {
    from_result(stat(raw_handle, out_ptr))
}

fn stat(raw_handle: u64, out_ptr: u64) -> KernelResult<u64> {
    let handle = checked_handle(raw_handle)?;
    let current = process::current_process()?;
    let object = current.handles().get(handle, AccessMask::READ)?;
    let node_handle = object
        .as_any()
        .downcast_ref::<fs::VfsNodeHandle>()
        .ok_or(KernelError::InvalidHandle { handle: raw_handle })?;
    let size = node_handle.node().stream_size()?;
    if out_ptr != 0 {
        // SAFETY: out_ptr names an 8-byte buffer in the caller's address
        // space, per the syscall ABI's pointer-argument contract.
        let out = unsafe { user_slice_mut(out_ptr, 8) };
        out.copy_from_slice(&size.to_ne_bytes());
    }
    Ok(size)
}
