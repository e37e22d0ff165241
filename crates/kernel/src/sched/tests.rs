use alloc::sync::Arc;

use super::*;

fn test_thread(priority: u8) -> Arc<Thread> {
    let tid = alloc_tid();
    Arc::new(Thread::new(tid, crate::process::kernel_process(), priority))
}

#[test_case]
fn priority_scheduling_prefers_highest_ready() {
    let mut scheduler = Scheduler::new();
    let low = test_thread(thread::PRIORITY_LOWEST);
    let high = test_thread(thread::PRIORITY_HIGHEST);

    scheduler.register(low.clone());
    scheduler.register(high.clone());

    let next = scheduler.pick_next().unwrap();
    assert_eq!(next.tid, high.tid);

    let next = scheduler.pick_next().unwrap();
    assert_eq!(next.tid, low.tid);

    assert!(scheduler.pick_next().is_none());
}

#[test_case]
fn same_priority_round_robins_fifo() {
    let mut scheduler = Scheduler::new();
    let a = test_thread(3);
    let b = test_thread(3);

    scheduler.register(a.clone());
    scheduler.register(b.clone());

    assert_eq!(scheduler.pick_next().unwrap().tid, a.tid);
    assert_eq!(scheduler.pick_next().unwrap().tid, b.tid);
}

#[test_case]
fn enqueue_marks_thread_ready() {
    let mut scheduler = Scheduler::new();
    let thread = test_thread(thread::PRIORITY_LOWEST);
    thread.set_state(ThreadState::Sleep);

    scheduler.register(thread.clone());
    assert_eq!(thread.state(), ThreadState::Ready);
}

#[test_case]
fn sleeper_is_not_woken_before_its_deadline() {
    let mut scheduler = Scheduler::new();
    let thread = test_thread(thread::PRIORITY_LOWEST);
    let deadline = ticks() + 5;

    scheduler.sleep_until(thread.clone(), deadline);
    assert_eq!(thread.state(), ThreadState::Sleep);

    scheduler.wake_expired();
    assert_eq!(thread.state(), ThreadState::Sleep);
    assert!(scheduler.pick_next().is_none());
}

#[test_case]
fn sleeper_is_requeued_once_its_deadline_elapses() {
    let mut scheduler = Scheduler::new();
    let thread = test_thread(thread::PRIORITY_LOWEST);
    let deadline = ticks() + 3;

    scheduler.sleep_until(thread.clone(), deadline);
    while ticks() < deadline {
        tick();
    }

    scheduler.wake_expired();
    assert_eq!(thread.state(), ThreadState::Ready);
    assert_eq!(scheduler.pick_next().unwrap().tid, thread.tid);
}

#[test_case]
fn cancel_sleep_removes_a_still_sleeping_thread() {
    let mut scheduler = Scheduler::new();
    let thread = test_thread(thread::PRIORITY_LOWEST);
    let deadline = ticks() + 100;

    scheduler.sleep_until(thread.clone(), deadline);
    let cancelled = scheduler.cancel_sleep(thread.tid, deadline);
    assert!(cancelled.is_some());

    scheduler.wake_expired();
    assert!(scheduler.pick_next().is_none());
}

#[test_case]
fn register_then_remove_drops_thread_from_lookup() {
    let mut scheduler = Scheduler::new();
    let thread = test_thread(thread::PRIORITY_LOWEST);

    scheduler.register(thread.clone());
    assert!(scheduler.thread(thread.tid).is_some());

    scheduler.remove(thread.tid);
    assert!(scheduler.thread(thread.tid).is_none());
}
