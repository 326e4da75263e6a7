//! Usage errors raised by the pool and the fork/join surface.

use thiserror::Error;

use crate::pool::MAX_WORKERS;

/// Errors surfaced by [`Pool`](crate::Pool) and [`Task`](crate::Task)
/// operations.
///
/// Every variant is a programmer-usage error, raised when an invariant of the
/// fork/join discipline is violated. None of them describe runtime conditions
/// and none are retried internally.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The requested worker count exceeds what the pool supports.
    #[error("worker count {requested} exceeds the supported maximum of {}", MAX_WORKERS)]
    InvalidConfig {
        /// The worker count passed to the constructor.
        requested: usize,
    },

    /// `invoke` was called after `terminate`.
    #[error("pool has been terminated and cannot receive tasks")]
    PoolTerminated,

    /// `fork` or `join` was called from a thread not attached to any pool.
    #[error("fork and join must be called from within a fork-join pool")]
    NotInPool,

    /// `fork` was called a second time on the same task.
    #[error("task has already been forked")]
    AlreadyForked,

    /// `join` was called before `fork` on the same task.
    #[error("task has not been forked")]
    NotForked,

    /// `join` was called while attached to a different pool than the one the
    /// task was forked in.
    #[error("task was forked in a different pool")]
    WrongPool,

    /// `join` was called a second time on the same task.
    #[error("task has already been joined")]
    AlreadyJoined,
}
