//! A work-stealing fork-join task pool with cooperative joins.
//!
//! Prong runs parallel divide-and-conquer computations. A task is a value
//! implementing [`Compute`]; its body may split its input, wrap the pieces
//! in [`Task`]s, [`fork`](Task::fork) them for asynchronous evaluation by
//! peer workers, and [`join`](Task::join) them to collect the results.
//! Submitting a task with [`Pool::invoke`] runs it synchronously on the
//! calling thread, which becomes a full participant of the pool, executing
//! and stealing pending work, until its own result is ready.
//!
//! Scheduling follows the classic work-stealing shape: every endpoint (each
//! internal worker, plus the shared external role) owns a deque of pending
//! evaluations. Owners push and pop at the front, so the most recently
//! forked sub-task (the one whose data is hottest) runs first locally,
//! while idle endpoints steal from the back of their peers' deques in a
//! fixed cyclic order, taking the oldest and typically largest pieces of
//! work. A `join` never parks its thread: while its evaluation is pending
//! the joiner keeps executing other work from the same ring, which is what
//! makes arbitrarily deep fork trees deadlock-free.
//!
//! Fork and join form a happens-before barrier: writes made before a `fork`
//! are visible to the thread that evaluates the task, and writes made during
//! the evaluation are visible after the matching `join` returns.
//!
//! The misuse surface is checked, not undefined: forking a task twice,
//! joining before forking, joining in the wrong pool, or forking outside
//! any pool all surface as [`Error`] values.
//!
//! See the [`task`] module for a worked example.

pub mod error;
pub mod pool;
pub mod task;

mod deque;
mod evaluation;
mod registry;
mod sampler;
mod util;

pub use error::Error;
pub use pool::{Pool, Strategy, DEFAULT_SLEEP, MAX_WORKERS};
pub use task::{Compute, Task};

pub mod prelude {
    pub use crate::{
        error::Error,
        pool::{Pool, Strategy},
        task::{Compute, Task},
    };
}
