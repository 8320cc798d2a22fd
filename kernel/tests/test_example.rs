//! Example tests demonstrating the `test_module!`/`kernel_test!` style for
//! small, self-contained assertions that don't need a full subsystem
//! bring-up, alongside the `kernel_bench!` style for microbenchmarks.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(veridian_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use veridian_kernel::{kernel_assert, kernel_assert_eq, kernel_test, serial_println, test_module};

test_module!(basic_tests,
    test_arithmetic => {
        let result = 2 + 2;
        kernel_assert_eq!(result, 4);
        Ok(())
    },

    test_raw_pointer_read => {
        let value = 42u32;
        let ptr = &value as *const u32;
        kernel_assert!(!ptr.is_null());
        kernel_assert_eq!(unsafe { *ptr }, 42);
        Ok(())
    },

    test_access_mask_bits => {
        use veridian_kernel::cap::AccessMask;

        let rights = AccessMask::READ | AccessMask::WRITE;
        kernel_assert!(rights.contains(AccessMask::READ));
        kernel_assert!(rights.contains(AccessMask::WRITE));
        kernel_assert!(!rights.contains(AccessMask::EXECUTE));
        Ok(())
    }
);

test_module!(integration_tests,
    test_rcu_shared_roundtrip => {
        use veridian_kernel::sync::{rcu_make_shared, RcuShared};

        let shared = rcu_make_shared(7u64);
        let weak = RcuShared::downgrade(&shared);
        kernel_assert_eq!(*weak.upgrade().ok_or("upgrade failed")?, 7);
        Ok(())
    },

    test_process_creation_without_table_init_fails => {
        use veridian_kernel::process;

        // The process table has not been brought up in this binary, so
        // creating the root process must fail rather than panic.
        match process::process::create_root_process() {
            Ok(_) => Err("root process creation should fail before table::init"),
            Err(_) => Ok(()),
        }
    }
);

#[cfg(feature = "benchmarks")]
mod benchmarks {
    use veridian_kernel::{kernel_bench, BenchmarkRunner};

    kernel_bench!(bench_atomic_increment, {
        use core::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        COUNTER.fetch_add(1, Ordering::Relaxed);
    });

    kernel_bench!(bench_spin_mutex, {
        use spin::Mutex;
        static LOCK: Mutex<u64> = Mutex::new(0);

        let mut guard = LOCK.lock();
        *guard += 1;
    });
}

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("\n=== Running Example Tests ===\n");
    test_main();
    loop {
        veridian_kernel::arch::halt();
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    veridian_kernel::test_panic_handler(info)
}
