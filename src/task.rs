//! The task contract: the user-implemented [`Compute`] unit of work and the
//! [`Task`] wrapper that gives it `fork` and `join`.
//!
//! A divide-and-conquer computation typically splits its input, wraps one
//! half in a [`Task`] and forks it for a peer to pick up, computes the other
//! half directly, then joins the forked half and combines:
//!
//! ```
//! use prong::{Compute, Error, Task};
//!
//! struct SumRange {
//!     lo: u64,
//!     hi: u64,
//! }
//!
//! impl Compute for SumRange {
//!     type Output = u64;
//!
//!     fn compute(&mut self) -> u64 {
//!         if self.hi - self.lo <= 1000 {
//!             return (self.lo..self.hi).sum();
//!         }
//!         let mid = self.lo + (self.hi - self.lo) / 2;
//!         let mut right = Task::new(SumRange { lo: mid, hi: self.hi });
//!         right.fork().expect("forked within the pool");
//!         let left = SumRange { lo: self.lo, hi: mid }.compute();
//!         left + right.join().expect("joined within the pool")
//!     }
//! }
//!
//! # fn main() -> Result<(), Error> {
//! let pool = prong::Pool::new(2, std::time::Duration::from_millis(1))?;
//! let total = pool.invoke(&mut SumRange { lo: 0, hi: 100_000 })?;
//! assert_eq!(total, 4_999_950_000);
//! pool.terminate();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::{
    error::Error,
    evaluation::{EvalRef, Evaluation},
    registry,
};

/// A unit of work, implemented by the user.
///
/// `compute` is an opaque synchronous computation. It may recursively create
/// further [`Task`]s, forking some and joining them, as long as every fork
/// and its matching join happen while attached to the same pool.
pub trait Compute: Send {
    /// The result of the computation. `()` for tasks that are pure actions.
    type Output: Send;

    /// Computes the result. Called exactly once per evaluation, either
    /// directly by the submitting thread ([`Pool::invoke`](crate::Pool::invoke))
    /// or by whichever endpoint retrieves the forked evaluation.
    fn compute(&mut self) -> Self::Output;
}

/// A forkable, joinable handle around a [`Compute`] value.
///
/// Each task may be forked at most once and joined at most once, the join
/// must follow the fork, and both must happen in the same pool. Violations
/// surface as [`Error`] values rather than being silently tolerated.
///
/// Forking moves the computation into the pool, so a forked task can no
/// longer be computed directly; conversely a task that was never forked
/// cannot be joined. The result of a successful `join` is the value produced
/// by the (exactly one) execution of `compute`, and every write that
/// execution made is visible to the joiner.
pub struct Task<C: Compute> {
    /// The computation, present until it is moved into an evaluation.
    computation: Option<C>,
    /// The single-slot reference to the in-flight evaluation, installed by
    /// `fork`.
    evaluation: Option<Arc<Evaluation<C>>>,
    /// The single-shot join flag.
    joined: bool,
}

impl<C> Task<C>
where
    C: Compute + 'static,
    C::Output: 'static,
{
    /// Wraps a computation for later forking.
    pub fn new(computation: C) -> Task<C> {
        Task {
            computation: Some(computation),
            evaluation: None,
            joined: false,
        }
    }

    /// Publishes this task for asynchronous evaluation by the pool the
    /// calling thread is attached to.
    ///
    /// The evaluation lands at the front of the calling endpoint's own
    /// deque, from where the same thread will preferentially resume it, or a
    /// peer will steal it from the back. Every write made by the calling
    /// thread before `fork` is visible to whichever thread evaluates the
    /// task.
    ///
    /// # Errors
    ///
    /// [`Error::NotInPool`] if the calling thread is not attached to any
    /// pool; [`Error::AlreadyForked`] if this task was forked before.
    pub fn fork(&mut self) -> Result<(), Error> {
        let sampler = registry::current().ok_or(Error::NotInPool)?;
        if self.evaluation.is_some() {
            return Err(Error::AlreadyForked);
        }
        // `computation` is always present when `evaluation` is empty.
        let computation = self.computation.take().ok_or(Error::AlreadyForked)?;
        let evaluation = Arc::new(Evaluation::new(computation, sampler.pool()));
        self.evaluation = Some(Arc::clone(&evaluation));
        sampler.add(evaluation as EvalRef);
        Ok(())
    }

    /// Waits for the forked evaluation to complete and returns its result.
    ///
    /// The wait is cooperative: while the evaluation is pending, the calling
    /// thread executes other evaluations obtained from its sampler, its own
    /// deque first and then steals, so a joiner never withholds its thread
    /// from the pool. The forked evaluation is eventually executed by some
    /// endpoint (possibly this one), and every write made during that
    /// execution is visible once `join` returns.
    ///
    /// # Errors
    ///
    /// [`Error::NotInPool`] if the calling thread is not attached to any
    /// pool; [`Error::NotForked`] if `fork` was never called;
    /// [`Error::WrongPool`] if the calling thread is attached to a different
    /// pool than the task was forked in; [`Error::AlreadyJoined`] if this
    /// task was joined before.
    pub fn join(&mut self) -> Result<C::Output, Error> {
        let sampler = registry::current().ok_or(Error::NotInPool)?;
        let evaluation = self.evaluation.as_ref().ok_or(Error::NotForked)?;
        if evaluation.pool() != sampler.pool() {
            return Err(Error::WrongPool);
        }
        if self.joined {
            return Err(Error::AlreadyJoined);
        }
        self.joined = true;

        while !evaluation.is_complete() {
            // Work on something else in the meantime; the sampler's built-in
            // idle step throttles the loop when the whole ring is empty.
            if let Some(other) = sampler.get() {
                other.execute();
            }
        }

        // The acquire read above makes the published answer visible, and a
        // joined task is never rejoined, so the slot is necessarily full.
        Ok(evaluation
            .take_answer()
            .expect("completed evaluation holds an answer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Answer;

    impl Compute for Answer {
        type Output = u32;
        fn compute(&mut self) -> u32 {
            42
        }
    }

    #[test]
    fn fork_outside_pool_is_rejected() {
        let mut task = Task::new(Answer);
        assert_eq!(task.fork(), Err(Error::NotInPool));
    }

    #[test]
    fn join_outside_pool_is_rejected() {
        let mut task = Task::new(Answer);
        assert_eq!(task.join().unwrap_err(), Error::NotInPool);
    }
}
