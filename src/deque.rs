//! The double-ended work queue underlying each scheduling endpoint.
//!
//! Every endpoint in the ring owns one `WorkDeque`. The owning side pushes
//! and pops at the front, so a worker always resumes the evaluation it forked
//! most recently, while thieves take from the back, grabbing the oldest (and
//! typically largest) unit of work in a single steal. The external deque is
//! owned collectively by every thread currently inside `invoke`, so all three
//! operations must tolerate arbitrary concurrent callers.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};

use crate::evaluation::EvalRef;

/// A shared handle to one endpoint's deque. Cache padded so that the hot
/// locks of neighbouring endpoints do not share a line.
pub(crate) type DequeRef = Arc<CachePadded<WorkDeque>>;

/// An unbounded deque of pending evaluations.
///
/// The mutex is the publication point: a handle pushed by a producer
/// happens-before its removal by any consumer, which is the fork→evaluation
/// edge the pool guarantees. An empty deque never blocks; `pop_front` and
/// `pop_back` simply return `None`.
pub(crate) struct WorkDeque {
    jobs: Mutex<VecDeque<EvalRef>>,
    /// Signalled on every push. Only the single-queue strategy ever waits on
    /// this; work-stealing endpoints sleep unconditionally instead.
    job_pushed: Condvar,
}

impl WorkDeque {
    pub(crate) fn new() -> DequeRef {
        Arc::new(CachePadded::new(WorkDeque {
            jobs: Mutex::new(VecDeque::new()),
            job_pushed: Condvar::new(),
        }))
    }

    /// Adds an evaluation at the owner end.
    pub(crate) fn push_front(&self, eval: EvalRef) {
        let mut jobs = self.jobs.lock();
        jobs.push_front(eval);
        self.job_pushed.notify_one();
    }

    /// Removes the most recently pushed evaluation. Owner side.
    pub(crate) fn pop_front(&self) -> Option<EvalRef> {
        self.jobs.lock().pop_front()
    }

    /// Removes the oldest evaluation. Thief side.
    pub(crate) fn pop_back(&self) -> Option<EvalRef> {
        self.jobs.lock().pop_back()
    }

    /// Like `pop_front`, but when the deque is empty waits up to `timeout`
    /// for a push before the final attempt.
    pub(crate) fn pop_front_wait(&self, timeout: Duration) -> Option<EvalRef> {
        let mut jobs = self.jobs.lock();
        if let Some(eval) = jobs.pop_front() {
            return Some(eval);
        }
        self.job_pushed.wait_for(&mut jobs, timeout);
        jobs.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::Execute;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tagged(usize, Arc<AtomicUsize>);

    impl Execute for Tagged {
        fn execute(&self) {
            self.1.store(self.0, Ordering::Relaxed);
        }
    }

    fn tagged(tag: usize, out: &Arc<AtomicUsize>) -> EvalRef {
        Arc::new(Tagged(tag, out.clone()))
    }

    fn run_tag(eval: EvalRef, out: &Arc<AtomicUsize>) -> usize {
        eval.execute();
        out.load(Ordering::Relaxed)
    }

    #[test]
    fn owner_side_is_lifo() {
        let out = Arc::new(AtomicUsize::new(0));
        let deque = WorkDeque::new();
        deque.push_front(tagged(1, &out));
        deque.push_front(tagged(2, &out));
        assert_eq!(run_tag(deque.pop_front().unwrap(), &out), 2);
        assert_eq!(run_tag(deque.pop_front().unwrap(), &out), 1);
        assert!(deque.pop_front().is_none());
    }

    #[test]
    fn thief_side_is_fifo() {
        let out = Arc::new(AtomicUsize::new(0));
        let deque = WorkDeque::new();
        deque.push_front(tagged(1, &out));
        deque.push_front(tagged(2, &out));
        assert_eq!(run_tag(deque.pop_back().unwrap(), &out), 1);
        assert_eq!(run_tag(deque.pop_back().unwrap(), &out), 2);
        assert!(deque.pop_back().is_none());
    }

    #[test]
    fn timed_pop_sees_concurrent_push() {
        let out = Arc::new(AtomicUsize::new(0));
        let deque = WorkDeque::new();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(5));
                deque.push_front(tagged(9, &out));
            });
            let eval = deque.pop_front_wait(Duration::from_secs(5)).unwrap();
            assert_eq!(run_tag(eval, &out), 9);
        });
    }
}
