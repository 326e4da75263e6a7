use std::{
    cell::UnsafeCell,
    mem::{needs_drop, MaybeUninit},
    sync::atomic::{AtomicU8, Ordering},
};

// -----------------------------------------------------------------------------
// Call on drop guard

/// A guard that runs the wrapped closure when dropped. Used to detach a thread
/// from its sampler even when the computation it hosts unwinds.
pub(crate) struct CallOnDrop<F: FnMut()>(pub F);

impl<F: FnMut()> Drop for CallOnDrop<F> {
    fn drop(&mut self) {
        (self.0)();
    }
}

// -----------------------------------------------------------------------------
// Slot

/// A one-shot atomic store. Like `Option`, a slot is either empty or holds a
/// single value, but the only way to observe the value is to remove it.
///
/// Two operations are supported:
/// + `put` inserts a value into an empty slot (and hands it back when the
///   slot is occupied).
/// + `take` removes the value from an occupied slot (and returns `None` when
///   the slot is empty).
///
/// Both are lock-free and neither spins: the failing path is a single atomic
/// compare-exchange. A successful `take` acquires everything the matching
/// `put` released, which is what lets an evaluation handle pass a computation
/// in and a result out with no further synchronisation.
pub(crate) struct Slot<T> {
    cell: UnsafeCell<MaybeUninit<T>>,
    state: AtomicU8,
}

/// The slot is empty. `put` is allowed, `take` is not.
const EMPTY: u8 = 0;

/// A `put` or `take` is mid-flight.
const BUSY: u8 = 1;

/// The slot holds a value. `take` is allowed, `put` is not.
const FULL: u8 = 2;

impl<T> Slot<T> {
    /// Creates an empty slot.
    pub(crate) const fn empty() -> Slot<T> {
        Slot {
            cell: UnsafeCell::new(MaybeUninit::uninit()),
            state: AtomicU8::new(EMPTY),
        }
    }

    /// Creates a slot already holding `value`.
    pub(crate) fn new(value: T) -> Slot<T> {
        Slot {
            cell: UnsafeCell::new(MaybeUninit::new(value)),
            state: AtomicU8::new(FULL),
        }
    }

    /// Tries to place `value` in the slot. An occupied slot rejects the
    /// insertion and returns the value to the caller; `None` means the value
    /// was stored.
    pub(crate) fn put(&self, value: T) -> Option<T> {
        match self
            .state
            .compare_exchange(EMPTY, BUSY, Ordering::Acquire, Ordering::Relaxed)
        {
            Err(_) => Some(value),
            Ok(_) => {
                // SAFETY: The winning compare-exchange grants exclusive access
                // to the cell until the state is stored below.
                unsafe {
                    (*self.cell.get()).write(value);
                }
                self.state.store(FULL, Ordering::Release);
                None
            }
        }
    }

    /// Removes and returns the value. Returns `None` if the slot is empty or
    /// another thread is mid-way through claiming it.
    pub(crate) fn take(&self) -> Option<T> {
        match self
            .state
            .compare_exchange(FULL, BUSY, Ordering::Acquire, Ordering::Relaxed)
        {
            Err(_) => None,
            Ok(_) => {
                // SAFETY: The winning compare-exchange grants exclusive access
                // to the cell, and the `FULL` state promises it is initialized.
                let value = unsafe { (*self.cell.get()).assume_init_read() };
                self.state.store(EMPTY, Ordering::Release);
                Some(value)
            }
        }
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        if needs_drop::<T>() {
            // The state is never `BUSY` here: `&mut self` proves no `put` or
            // `take` is mid-flight.
            if *self.state.get_mut() == FULL {
                // SAFETY: `FULL` means the cell was initialized and not taken.
                unsafe {
                    self.cell.get_mut().assume_init_drop();
                }
            }
        }
    }
}

// SAFETY: A `Slot<T>` owns a `T`, so it can move between threads when `T` can.
unsafe impl<T> Send for Slot<T> where T: Send {}

// SAFETY: A `&Slot<T>` lets any thread extract the `T` via `take`, which is a
// transfer of ownership. So sharing a slot is sound exactly when `T: Send`.
unsafe impl<T> Sync for Slot<T> where T: Send {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_take() {
        let slot = Slot::empty();
        assert_eq!(slot.put(7), None);
        assert_eq!(slot.take(), Some(7));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn put_rejects_when_full() {
        let slot = Slot::new("first");
        assert_eq!(slot.put("second"), Some("second"));
        assert_eq!(slot.take(), Some("first"));
    }

    #[test]
    fn drops_unclaimed_value() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let slot = Slot::new(Counted(drops.clone()));
        drop(slot);
        assert_eq!(drops.load(Ordering::Relaxed), 1);

        let drops = Arc::new(AtomicUsize::new(0));
        let slot = Slot::new(Counted(drops.clone()));
        drop(slot.take());
        drop(slot);
        assert_eq!(drops.load(Ordering::Relaxed), 1);
    }
}
