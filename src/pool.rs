//! The pool: endpoint ring construction, worker threads, submission, and
//! termination.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use tracing::{debug, trace};

use crate::{
    deque::{DequeRef, WorkDeque},
    error::Error,
    registry,
    sampler::{IdleMode, Sampler},
    task::Compute,
    util::CallOnDrop,
};

// -----------------------------------------------------------------------------
// Pool types

/// The maximum number of internal workers a pool will accept.
pub const MAX_WORKERS: usize = 512;

/// How long an endpoint idles after failing to find work anywhere, unless
/// configured otherwise.
pub const DEFAULT_SLEEP: Duration = Duration::from_millis(1);

/// How the pool's endpoints share pending work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// One deque per endpoint; owners pop newest-first from their own deque
    /// and steal oldest-first from their peers in a fixed cyclic order.
    #[default]
    WorkStealing,
    /// One deque shared by every endpoint. Cheaper to reason about and able
    /// to wake idle endpoints the moment work appears, at the cost of every
    /// endpoint contending on the same queue.
    SingleQueue,
}

/// A fork-join task pool.
///
/// The pool owns `num_workers` dedicated worker threads plus one *external*
/// endpoint shared by every thread that calls [`Pool::invoke`]. A submitting
/// thread is not a bystander: for the duration of its `invoke` it
/// participates in the pool exactly like a worker, executing and stealing
/// pending evaluations while it waits on its own result. A pool with zero
/// workers is legal; the submitting threads then perform all of the work.
///
/// Dropping the pool terminates it (see [`Pool::terminate`]).
pub struct Pool {
    core: Arc<PoolCore>,
    external: Arc<Sampler>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").finish_non_exhaustive()
    }
}

/// State shared by the pool handle and every sampler: the pool's identity
/// and its termination flag. Samplers hold this rather than the `Pool`
/// itself, keeping ownership acyclic.
pub(crate) struct PoolCore {
    terminated: AtomicBool,
}

impl PoolCore {
    pub(crate) fn new() -> Arc<PoolCore> {
        Arc::new(PoolCore {
            terminated: AtomicBool::new(false),
        })
    }

    pub(crate) fn id(self: &Arc<Self>) -> PoolId {
        PoolId(Arc::as_ptr(self) as usize)
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Raises the termination flag. Returns whether it was already raised.
    fn terminate(&self) -> bool {
        self.terminated.swap(true, Ordering::AcqRel)
    }
}

/// An opaque pool identity, recorded in each evaluation at fork time and
/// compared at join time. Valid only while the pool it names is alive; no
/// task or evaluation may outlive its pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PoolId(usize);

impl PoolId {
    /// An identity that matches no live pool. Unit tests only.
    #[cfg(test)]
    pub(crate) fn none() -> PoolId {
        PoolId(0)
    }
}

// -----------------------------------------------------------------------------
// Pool construction

impl Pool {
    /// Creates a work-stealing pool with `num_workers` internal workers and
    /// the given idle sleep duration.
    ///
    /// A zero sleep is legal and turns idle circuits into a busy spin.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if `num_workers` exceeds [`MAX_WORKERS`].
    pub fn new(num_workers: usize, sleep: Duration) -> Result<Pool, Error> {
        Pool::with_strategy(Strategy::WorkStealing, num_workers, sleep)
    }

    /// Creates a pool with an explicit scheduling [`Strategy`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if `num_workers` exceeds [`MAX_WORKERS`].
    pub fn with_strategy(
        strategy: Strategy,
        num_workers: usize,
        sleep: Duration,
    ) -> Result<Pool, Error> {
        if num_workers > MAX_WORKERS {
            return Err(Error::InvalidConfig {
                requested: num_workers,
            });
        }

        let core = PoolCore::new();
        let pool = match strategy {
            Strategy::WorkStealing => Pool::build_work_stealing(core, num_workers, sleep),
            Strategy::SingleQueue => Pool::build_single_queue(core, num_workers, sleep),
        };

        debug!(
            pool = pool.core.id().0,
            workers = num_workers,
            ?strategy,
            "pool started"
        );
        Ok(pool)
    }

    /// Builds the ring: `num_workers + 1` deques (the last one external),
    /// one sampler per endpoint whose steal list visits every *other* deque
    /// in cyclic order, and one thread per internal endpoint.
    fn build_work_stealing(core: Arc<PoolCore>, num_workers: usize, sleep: Duration) -> Pool {
        let endpoints = num_workers + 1;
        let deques: Vec<DequeRef> = (0..endpoints).map(|_| WorkDeque::new()).collect();

        let mut samplers: Vec<Arc<Sampler>> = (0..endpoints)
            .map(|index| {
                // Endpoint `index` visits `index + 1, index + 2, ...` modulo
                // the ring size, never revisiting its own deque.
                let others = (1..endpoints)
                    .map(|step| Arc::clone(&deques[(index + step) % endpoints]))
                    .collect();
                Arc::new(Sampler::new(
                    Arc::clone(&deques[index]),
                    others,
                    Arc::clone(&core),
                    sleep,
                    IdleMode::Sleep,
                ))
            })
            .collect();

        let external = samplers.pop().expect("ring has at least one endpoint");
        for (index, sampler) in samplers.into_iter().enumerate() {
            spawn_worker(index, sampler);
        }

        Pool { core, external }
    }

    /// Builds the single-queue configuration: one shared deque, one sampler
    /// shared by every endpoint, parking instead of sleeping on a miss.
    fn build_single_queue(core: Arc<PoolCore>, num_workers: usize, sleep: Duration) -> Pool {
        let sampler = Arc::new(Sampler::new(
            WorkDeque::new(),
            Vec::new(),
            Arc::clone(&core),
            sleep,
            IdleMode::Park,
        ));

        for index in 0..num_workers {
            spawn_worker(index, Arc::clone(&sampler));
        }

        Pool {
            core,
            external: sampler,
        }
    }
}

impl Default for Pool {
    /// A work-stealing pool sized to the machine: one worker per available
    /// CPU except one, reserving the last seat for the submitting thread
    /// itself, with the default 1 ms idle sleep.
    fn default() -> Pool {
        let num_workers = thread::available_parallelism()
            .map(|cpus| cpus.get())
            .unwrap_or(1)
            .saturating_sub(1);
        let num_workers = usize::min(num_workers, MAX_WORKERS);
        Pool::new(num_workers, DEFAULT_SLEEP).expect("default worker count is within bounds")
    }
}

// -----------------------------------------------------------------------------
// Submission and termination

impl Pool {
    /// Submits a task and returns its result once complete.
    ///
    /// The calling thread does not hand the task off and wait: it attaches
    /// to the pool's external endpoint and runs `compute` itself. Any
    /// sub-task the computation forks lands on the external deque, from
    /// where internal workers steal it, and whenever the computation joins a
    /// pending sub-task the calling thread works on other pool jobs in the
    /// meantime. The thread detaches when the computation finishes, even if
    /// it unwinds.
    ///
    /// Any number of threads may invoke concurrently; they share the
    /// external endpoint. A thread already attached to another pool may
    /// invoke here too, and returns to its previous pool afterwards.
    ///
    /// # Errors
    ///
    /// [`Error::PoolTerminated`] if [`Pool::terminate`] was called before
    /// this submission.
    pub fn invoke<C: Compute>(&self, task: &mut C) -> Result<C::Output, Error> {
        if self.is_terminated() {
            return Err(Error::PoolTerminated);
        }

        registry::attach(Arc::clone(&self.external));
        let _detach = CallOnDrop(registry::detach);
        Ok(task.compute())
    }

    /// Signals the pool to shut down and returns immediately.
    ///
    /// Worker threads observe the flag between evaluations and exit; they
    /// are not interrupted mid-computation. Threads currently inside
    /// [`Pool::invoke`] keep going until their task completes: the deques
    /// outlive the workers, so an external thread can still drain and steal
    /// whatever the exiting workers left queued. Calling this a second time
    /// has no effect.
    pub fn terminate(&self) {
        if !self.core.terminate() {
            debug!(pool = self.core.id().0, "pool terminated");
        }
    }

    /// Whether [`Pool::terminate`] has been called.
    pub fn is_terminated(&self) -> bool {
        self.core.is_terminated()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.terminate();
    }
}

// -----------------------------------------------------------------------------
// Worker runtime

fn spawn_worker(index: usize, sampler: Arc<Sampler>) {
    thread::Builder::new()
        .name(format!("fj-worker-{index}"))
        .spawn(move || main_loop(index, sampler))
        .expect("failed to spawn worker thread");
}

/// The main loop of an internal worker: register, fetch-and-execute until
/// the pool is terminated, deregister.
///
/// The worker never forks or joins on its own behalf; it only executes
/// evaluations produced by task code. Work still queued on its deque when it
/// exits is not lost: the deque stays reachable from every other sampler in
/// the ring and is drained by the remaining participants.
fn main_loop(index: usize, sampler: Arc<Sampler>) {
    trace!(worker = index, "worker started");
    registry::attach(Arc::clone(&sampler));

    while !sampler.is_terminated() {
        if let Some(eval) = sampler.get() {
            eval.execute();
        }
    }

    registry::detach();
    trace!(worker = index, "worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;

    const SLEEP: Duration = Duration::from_micros(100);

    struct Depth;

    impl Compute for Depth {
        type Output = usize;
        fn compute(&mut self) -> usize {
            registry::depth()
        }
    }

    #[test]
    fn invoke_attaches_and_detaches() {
        let pool = Pool::new(0, SLEEP).unwrap();
        assert_eq!(registry::depth(), 0);
        assert_eq!(pool.invoke(&mut Depth).unwrap(), 1);
        assert_eq!(registry::depth(), 0);
    }

    struct NestedDepth;

    impl Compute for NestedDepth {
        type Output = (usize, usize, usize);
        fn compute(&mut self) -> (usize, usize, usize) {
            let before = registry::depth();
            let inner = Pool::new(0, SLEEP).unwrap();
            let within = inner.invoke(&mut Depth).unwrap();
            inner.terminate();
            (before, within, registry::depth())
        }
    }

    #[test]
    fn nested_invoke_restores_the_stack() {
        let pool = Pool::new(0, SLEEP).unwrap();
        assert_eq!(pool.invoke(&mut NestedDepth).unwrap(), (1, 2, 1));
        assert_eq!(registry::depth(), 0);
    }

    struct Panicker;

    impl Compute for Panicker {
        type Output = ();
        fn compute(&mut self) {
            panic!("task body failure");
        }
    }

    #[test]
    fn invoke_detaches_when_the_computation_unwinds() {
        let pool = Pool::new(0, SLEEP).unwrap();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pool.invoke(&mut Panicker)
        }));
        assert!(outcome.is_err());
        assert_eq!(registry::depth(), 0);

        // The pool stays usable for other work.
        assert_eq!(pool.invoke(&mut Depth).unwrap(), 1);
    }

    #[test]
    fn oversized_pool_is_rejected() {
        let err = Pool::new(MAX_WORKERS + 1, SLEEP).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidConfig {
                requested: MAX_WORKERS + 1
            }
        );
    }

    #[test]
    fn terminate_is_idempotent() {
        let pool = Pool::new(1, SLEEP).unwrap();
        assert!(!pool.is_terminated());
        pool.terminate();
        pool.terminate();
        assert!(pool.is_terminated());
        assert_eq!(pool.invoke(&mut Depth).unwrap_err(), Error::PoolTerminated);
    }
}
