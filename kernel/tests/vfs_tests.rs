//! Virtual filesystem integration tests: ram filesystem driver, mount
//! composition, and path resolution exercised against the global [`fs`]
//! singleton the way a syscall handler would reach it.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(veridian_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use veridian_kernel::{
    error::{FsError, KernelError},
    fs::{self, ramfs, NodeKind},
    kernel_assert, kernel_assert_eq,
    serial_println,
};

#[path = "common/mod.rs"]
mod common;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    common::init_test_env("VFS Tests");
    test_main();
    loop {
        veridian_kernel::arch::halt();
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    veridian_kernel::test_panic_handler(info)
}

#[test_case]
fn global_root_rejects_unknown_path() {
    fs::init();
    kernel_assert!(matches!(
        fs::resolve(b"does-not-exist"),
        Err(KernelError::FsError(FsError::NotFound))
    ));
}

#[test_case]
fn nested_directory_and_file_resolve_by_path() {
    let dir = ramfs::RamDirectory::new();
    dir.mkdir(b"etc").expect("mkdir");
    let etc = dir.lookup(b"etc").expect("lookup etc");
    etc.create(b"hostname").expect("create hostname");

    let mut root = fs::VfsRoot::new(dir);
    let node = root.resolve(b"etc\0hostname").expect("resolve");
    kernel_assert_eq!(node.node_type(), NodeKind::File);

    root.mount(b"mnt", ramfs::RamDirectory::new()).expect("mount");
    kernel_assert!(root.resolve(b"mnt").is_ok());
}
