//! The logical context switch.
//!
//! Spec §1 scopes the CPU exception/syscall entry stubs (the assembly
//! trampolines an interrupt lands in before calling into the kernel) out of
//! this kernel; what remains in scope is the logical operation those
//! trampolines would invoke once an interrupt has already saved the
//! interrupted thread's machine state: pick the next runnable thread off
//! [`super::queue`] and swap [`crate::arch::x86_64::context::X86_64Context`]
//! with it via the teacher's [`crate::arch::x86_64::context::switch_context`]
//! routine. Grounded on the teacher's `sched::scheduler` (requeue-then-pick
//! loop, per-CPU "current" bookkeeping), with the CFS vruntime/priority
//! selection replaced by straight FIFO since [`super::queue`] is a plain
//! runnable queue.

use crate::{
    arch::x86_64::context::{restore_fpu_state, save_fpu_state, switch_context, X86_64Context},
    process::thread::{self, ScheduleState, ThreadId},
};

use super::{queue, smp};

/// Requeue the previously running thread (if it is still runnable) and pick
/// the next thread off the runnable queue, context-switching into it. A
/// no-op if nothing else is runnable: the current thread simply keeps
/// running. Mirrors spec §4.8's `switchCurrentContext`: save the outgoing
/// thread's register set and FPU state, pick the next thread, restore its
/// state, and swap the per-CPU "current thread" pointer that this kernel's
/// `%gs:0`-resident `.cpudata` base would otherwise be reprogrammed to
/// reference (`smp::set_current_thread` below).
pub fn switch_current_context() {
    let prev_tid = smp::current_thread();
    requeue_if_still_running(prev_tid);

    let next_tid = match next_runnable() {
        Some(tid) => tid,
        None => return,
    };

    if Some(next_tid) == prev_tid {
        return;
    }

    let next = match thread::lookup(next_tid) {
        Ok(thread) => thread,
        Err(_) => return,
    };

    match prev_tid.and_then(|tid| thread::lookup(tid).ok()) {
        Some(prev) => {
            prev.with_fpu_state_mut(save_fpu_state);
            smp::set_current_thread(Some(next_tid));
            next.with_fpu_state_mut(restore_fpu_state_from);
            prev.with_context_mut(|from_ctx| {
                next.with_context(|to_ctx| switch_context(from_ctx, to_ctx));
            });
        }
        None => {
            smp::set_current_thread(Some(next_tid));
            next.with_fpu_state_mut(restore_fpu_state_from);
            let mut scratch = X86_64Context::new(0, 0);
            next.with_context(|to_ctx| switch_context(&mut scratch, to_ctx));
        }
    }
}

fn restore_fpu_state_from(state: &mut crate::arch::x86_64::context::FpuState) {
    restore_fpu_state(state);
}

/// Make the calling thread's current CPU pick a new thread without waiting
/// for the next timer tick.
pub fn yield_now() {
    switch_current_context();
}

/// Mark `tid` ready and push it onto the runnable queue.
pub fn enqueue(tid: ThreadId) {
    if let Ok(t) = thread::lookup(tid) {
        t.schedule_state().set(ScheduleState::Ready);
    }
    queue::add_work_item(tid);
}

fn requeue_if_still_running(prev_tid: Option<ThreadId>) {
    let Some(tid) = prev_tid else { return };
    let Ok(prev) = thread::lookup(tid) else { return };
    if prev.state() == ScheduleState::Running {
        prev.schedule_state().set(ScheduleState::Ready);
        queue::add_work_item(tid);
    }
}

/// Pop threads off the queue until one successfully transitions
/// `Ready -> Running` (skipping ids whose thread has since exited, or that
/// another CPU raced us to start first).
fn next_runnable() -> Option<ThreadId> {
    loop {
        let tid = queue::get_work_item()?;
        match thread::lookup(tid) {
            // Succeeds whether this is a genuinely idle thread or the
            // previously running one that `requeue_if_still_running` just
            // pushed back as Ready.
            Ok(t) if t.schedule_state().try_start_running() => return Some(tid),
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessId;

    #[test]
    fn yield_with_nothing_runnable_is_a_no_op() {
        thread::init();
        while queue::get_work_item().is_some() {}
        yield_now();
    }

    #[test]
    fn enqueue_marks_ready_and_queues() {
        thread::init();
        let (thread, _handle) =
            thread::spawn(ProcessId(1), 0xffff_8000_0010_0000, 0x1000, 0x7fff_0000).unwrap();
        thread.schedule_state().try_start_running();
        enqueue(thread.tid());
        assert_eq!(thread.state(), ScheduleState::Ready);
        assert_eq!(queue::get_work_item(), Some(thread.tid()));
    }
}
