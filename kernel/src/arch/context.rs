//! Architecture-independent thread context management interface.

/// Per-thread saved CPU register state.
#[allow(dead_code)]
pub trait ThreadContext: Sized {
    /// Create a new empty context.
    fn new() -> Self;

    /// Initialize context for a new thread.
    fn init(&mut self, entry_point: usize, stack_pointer: usize, kernel_stack: usize);

    fn get_instruction_pointer(&self) -> usize;
    fn set_instruction_pointer(&mut self, ip: usize);
    fn get_stack_pointer(&self) -> usize;
    fn set_stack_pointer(&mut self, sp: usize);
    fn get_kernel_stack(&self) -> usize;
    fn set_kernel_stack(&mut self, sp: usize);

    /// Set return value (for syscalls, fork, etc.)
    fn set_return_value(&mut self, value: usize);

    fn clone_from(&mut self, other: &Self);
}

/// Architecture-specific thread context type.
pub type ArchThreadContext = crate::arch::x86_64::context::X86_64Context;

/// Perform a context switch between two threads.
///
/// # Safety
/// Must be called with interrupts disabled; both contexts must be valid.
#[allow(dead_code)]
pub unsafe fn switch_context(from: &mut ArchThreadContext, to: &ArchThreadContext) {
    crate::arch::x86_64::context::switch_context(from, to);
}

/// Initialize FPU/SIMD for the current CPU.
#[allow(dead_code)]
pub fn init_fpu() {
    crate::arch::x86_64::context::init_fpu();
}

/// Save FPU/SIMD state.
#[allow(dead_code)]
pub fn save_fpu_state(state: &mut [u8]) {
    // SAFETY: the caller guarantees `state` is at least
    // `size_of::<FpuState>()` bytes, suitably aligned for FXSAVE.
    unsafe {
        crate::arch::x86_64::context::save_fpu_state(
            &mut *(state.as_mut_ptr() as *mut crate::arch::x86_64::context::FpuState),
        );
    }
}

/// Restore FPU/SIMD state.
#[allow(dead_code)]
pub fn restore_fpu_state(state: &[u8]) {
    // SAFETY: the caller guarantees `state` holds a previously saved
    // `FpuState` of the correct size and alignment.
    unsafe {
        crate::arch::x86_64::context::restore_fpu_state(
            &*(state.as_ptr() as *const crate::arch::x86_64::context::FpuState),
        );
    }
}
