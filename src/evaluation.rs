//! The evaluation handle: a one-shot record tying a forked task to its
//! in-flight asynchronous execution.
//!
//! A handle is created by `fork`, enqueued on the forking endpoint's deque,
//! removed by exactly one endpoint (possibly the forking thread itself during
//! a cooperative join), executed exactly once, and finally drained by the
//! joiner. Completion is published with release semantics and observed with
//! acquire semantics, so the result slot needs no synchronisation of its own.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{pool::PoolId, task::Compute, util::Slot};

// -----------------------------------------------------------------------------
// Erased evaluations

/// The type-erased face of an evaluation, as carried by the work deques and
/// executed by whichever endpoint retrieves it.
pub(crate) trait Execute: Send + Sync {
    /// Runs the underlying computation to completion and publishes its
    /// result. Idempotent only in the degenerate sense: a second call finds
    /// the computation gone and does nothing.
    fn execute(&self);
}

/// A shared reference to a pending evaluation.
pub(crate) type EvalRef = Arc<dyn Execute>;

// -----------------------------------------------------------------------------
// Evaluation

/// An asynchronous evaluation of a single computation.
///
/// The computation sits in a one-shot slot, so even if a reference were ever
/// handed to two endpoints, only one of them could take and run it. The pool
/// identity is recorded at fork time and checked at join time.
pub(crate) struct Evaluation<C: Compute> {
    computation: Slot<C>,
    answer: Slot<C::Output>,
    complete: AtomicBool,
    pool: PoolId,
}

impl<C: Compute> Evaluation<C> {
    pub(crate) fn new(computation: C, pool: PoolId) -> Evaluation<C> {
        Evaluation {
            computation: Slot::new(computation),
            answer: Slot::empty(),
            complete: AtomicBool::new(false),
            pool,
        }
    }

    /// The pool this evaluation was forked in.
    pub(crate) fn pool(&self) -> PoolId {
        self.pool
    }

    /// Whether the computation has finished and its answer is published.
    ///
    /// The acquire load pairs with the release store in [`Execute::execute`]:
    /// once this returns `true`, every write the evaluating thread made
    /// during `compute` is visible to the caller.
    pub(crate) fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Removes the published answer. Must only be called after
    /// [`Evaluation::is_complete`] has returned `true`.
    pub(crate) fn take_answer(&self) -> Option<C::Output> {
        self.answer.take()
    }
}

impl<C: Compute> Execute for Evaluation<C> {
    fn execute(&self) {
        if let Some(mut computation) = self.computation.take() {
            let answer = computation.compute();
            let rejected = self.answer.put(answer);
            debug_assert!(rejected.is_none());
            self.complete.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolId;

    struct Double(u32);

    impl Compute for Double {
        type Output = u32;
        fn compute(&mut self) -> u32 {
            self.0 * 2
        }
    }

    #[test]
    fn executes_once_and_publishes() {
        let eval = Evaluation::new(Double(21), PoolId::none());
        assert!(!eval.is_complete());
        eval.execute();
        assert!(eval.is_complete());
        assert_eq!(eval.take_answer(), Some(42));

        // A stray second execution is inert: the computation is gone.
        eval.execute();
        assert_eq!(eval.take_answer(), None);
    }
}
