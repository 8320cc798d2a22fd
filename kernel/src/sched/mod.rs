//! Thread scheduling: a shared runnable queue plus the per-CPU logical
//! context switch the timer tick and voluntary yields drive.
//!
//! Grounded on the teacher's `sched` module (per-CPU accessors, runnable
//! queue, timer-driven preemption), reduced to the single FIFO the scheduler
//! hands out runnable threads with rather than the teacher's CFS/priority
//! class hierarchy — spec §4.8 describes one queue, not a scheduling-class
//! family.

pub mod queue;
pub mod scheduler;
pub mod smp;

use crate::process::thread::ThreadId;

pub fn init() {
    smp::init();
    log::info!(
        "sched: runnable queue online, boot cpu {} ready",
        smp::current_cpu_id()
    );
}

/// The thread running on the current CPU, or `None` before the scheduler
/// has switched to anything (e.g. during early boot).
pub fn current_thread_id() -> Option<ThreadId> {
    smp::current_thread()
}

/// Make `tid` runnable.
pub fn add_work_item(tid: ThreadId) {
    scheduler::enqueue(tid);
}

/// Driven by the architecture timer tick: report this CPU's quiescent state
/// to the RCU domain (a thread switch is always a quiescent point, per spec
/// §5's suspension-point list) and run one round of preemption.
pub fn timer_tick() {
    crate::sync::rcu::rcu_quiescent();
    scheduler::switch_current_context();
}

/// Voluntarily give up the CPU.
pub fn yield_now() {
    scheduler::yield_now();
}

/// Idle loop entered once boot-time initialization finishes. Every actual
/// thread switch happens off the back of `timer_tick`/`yield_now`; this
/// never returns.
pub fn run() -> ! {
    loop {
        crate::arch::idle();
    }
}
