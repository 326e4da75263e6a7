//! The thread-to-sampler binding registry.
//!
//! Every thread that participates in a pool (worker threads for their whole
//! lifetime, external threads for the duration of an `invoke`) is bound to
//! the sampler of the endpoint it occupies. `fork` and `join` consult this
//! binding to find out where the calling thread should deposit and look for
//! work; an unbound thread is the sole signal for `NotInPool`.
//!
//! The binding is a stack, not a single reference: a thread already attached
//! to pool A that calls `invoke` on pool B pushes B's external sampler on
//! top, routes nested fork/join traffic to B for the duration of that call,
//! and pops back to A when it returns. Multiple external threads sharing one
//! pool's external sampler each keep their own stack entry.
//!
//! Only the owning thread ever touches its own stack, so thread-local storage
//! fits exactly and no cross-thread locking is needed anywhere.

use std::{cell::RefCell, sync::Arc};

use crate::sampler::Sampler;

thread_local! {
    static SAMPLER_STACK: RefCell<Vec<Arc<Sampler>>> = const { RefCell::new(Vec::new()) };
}

/// Binds the calling thread to `sampler` until the matching [`detach`].
pub(crate) fn attach(sampler: Arc<Sampler>) {
    SAMPLER_STACK.with(|stack| stack.borrow_mut().push(sampler));
}

/// Unbinds the calling thread from its most recent attachment, restoring
/// whatever it was attached to before.
pub(crate) fn detach() {
    SAMPLER_STACK.with(|stack| {
        let popped = stack.borrow_mut().pop();
        debug_assert!(popped.is_some(), "detach without a matching attach");
    });
}

/// The sampler the calling thread is currently bound to, if any.
pub(crate) fn current() -> Option<Arc<Sampler>> {
    SAMPLER_STACK.with(|stack| stack.borrow().last().cloned())
}

/// The calling thread's attachment depth. Used by tests to check that nested
/// invokes restore the stack.
#[cfg(test)]
pub(crate) fn depth() -> usize {
    SAMPLER_STACK.with(|stack| stack.borrow().len())
}
