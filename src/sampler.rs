//! The per-endpoint scheduling router.
//!
//! A sampler is how one endpoint of the ring (an internal worker, or the
//! shared external role) deposits and finds work. It owns one deque and
//! holds the deques of every other endpoint in a fixed cyclic order:
//! endpoint `i` of `n + 1` visits `i + 1, i + 2, …` modulo `n + 1`, so steal
//! pressure spreads evenly around the ring and no endpoint revisits itself.

use std::{sync::Arc, thread, time::Duration};

use crate::{
    deque::DequeRef,
    evaluation::EvalRef,
    pool::{PoolCore, PoolId},
};

/// What a sampler does after a full miss circuit.
#[derive(Clone, Copy, Debug)]
pub(crate) enum IdleMode {
    /// Sleep for the configured duration. Work-stealing endpoints have no
    /// wake-up channel, so new work is picked up on the next circuit, within
    /// one sleep of appearing.
    Sleep,
    /// Park on the owned deque until something is pushed or the configured
    /// duration elapses. Single-queue endpoints all own the same deque, so a
    /// push anywhere wakes a parked endpoint promptly.
    Park,
}

/// One endpoint's view of the pool's deques.
pub(crate) struct Sampler {
    /// The deque this endpoint deposits into and drains first.
    own: DequeRef,
    /// Every other endpoint's deque, in cyclic steal order.
    others: Vec<DequeRef>,
    /// The owning pool's shared state: identity and termination flag.
    core: Arc<PoolCore>,
    /// How long to idle after a full miss circuit.
    sleep: Duration,
    idle: IdleMode,
}

impl Sampler {
    pub(crate) fn new(
        own: DequeRef,
        others: Vec<DequeRef>,
        core: Arc<PoolCore>,
        sleep: Duration,
        idle: IdleMode,
    ) -> Sampler {
        Sampler {
            own,
            others,
            core,
            sleep,
            idle,
        }
    }

    /// Deposits a freshly forked evaluation at the front of the owned deque.
    pub(crate) fn add(&self, eval: EvalRef) {
        self.own.push_front(eval);
    }

    /// Finds the next evaluation for this endpoint: newest local work first,
    /// then the oldest work of each peer in cyclic order. A full miss idles
    /// for the configured duration and returns `None`; callers loop rather
    /// than block.
    pub(crate) fn get(&self) -> Option<EvalRef> {
        if let Some(eval) = self.own.pop_front() {
            return Some(eval);
        }

        for deque in &self.others {
            if let Some(stolen) = deque.pop_back() {
                return Some(stolen);
            }
        }

        match self.idle {
            IdleMode::Sleep => {
                thread::sleep(self.sleep);
                None
            }
            IdleMode::Park => self.own.pop_front_wait(self.sleep),
        }
    }

    /// The identity of the pool this sampler belongs to.
    pub(crate) fn pool(&self) -> PoolId {
        self.core.id()
    }

    /// Whether the owning pool has been told to shut down.
    pub(crate) fn is_terminated(&self) -> bool {
        self.core.is_terminated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deque::WorkDeque;
    use crate::evaluation::Execute;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tagged(usize, Arc<AtomicUsize>);

    impl Execute for Tagged {
        fn execute(&self) {
            self.1.store(self.0, Ordering::Relaxed);
        }
    }

    fn sampler(own: DequeRef, others: Vec<DequeRef>) -> Sampler {
        Sampler::new(
            own,
            others,
            PoolCore::new(),
            Duration::from_micros(10),
            IdleMode::Sleep,
        )
    }

    fn run_tag(eval: EvalRef, out: &Arc<AtomicUsize>) -> usize {
        eval.execute();
        out.load(Ordering::Relaxed)
    }

    #[test]
    fn drains_own_deque_before_stealing() {
        let out = Arc::new(AtomicUsize::new(0));
        let own = WorkDeque::new();
        let other = WorkDeque::new();
        other.push_front(Arc::new(Tagged(1, out.clone())));
        own.push_front(Arc::new(Tagged(2, out.clone())));

        let sampler = sampler(own, vec![other]);
        assert_eq!(run_tag(sampler.get().unwrap(), &out), 2);
        assert_eq!(run_tag(sampler.get().unwrap(), &out), 1);
        assert!(sampler.get().is_none());
    }

    #[test]
    fn steals_in_declared_order() {
        let out = Arc::new(AtomicUsize::new(0));
        let own = WorkDeque::new();
        let first = WorkDeque::new();
        let second = WorkDeque::new();
        second.push_front(Arc::new(Tagged(20, out.clone())));
        first.push_front(Arc::new(Tagged(10, out.clone())));

        let sampler = sampler(own, vec![first, second]);
        assert_eq!(run_tag(sampler.get().unwrap(), &out), 10);
        assert_eq!(run_tag(sampler.get().unwrap(), &out), 20);
    }

    #[test]
    fn steals_oldest_from_peers() {
        let out = Arc::new(AtomicUsize::new(0));
        let own = WorkDeque::new();
        let peer = WorkDeque::new();
        peer.push_front(Arc::new(Tagged(1, out.clone())));
        peer.push_front(Arc::new(Tagged(2, out.clone())));

        let sampler = sampler(own, vec![peer]);
        assert_eq!(run_tag(sampler.get().unwrap(), &out), 1);
        assert_eq!(run_tag(sampler.get().unwrap(), &out), 2);
    }
}
