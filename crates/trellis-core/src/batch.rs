use std::marker::PhantomData;
use std::rc::Rc;

use crate::log_target;
use crate::reactive;

struct BatchGuard {
    // Batches are per-thread.
    _not_send: PhantomData<Rc<()>>,
}

impl BatchGuard {
    fn enter() -> Self {
        reactive::begin_batch();
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        // On unwind the written sources stay recorded; the next outermost
        // batch or `flush_effects` picks them up.
        if reactive::end_batch() && !std::thread::panicking() {
            reactive::flush_batch();
        }
    }
}

/// Defer notifications until `f` returns. Every effect observing a signal
/// written inside runs at most once when the outermost batch closes.
pub fn batch(f: impl FnOnce()) {
    batch_value(f)
}

pub fn batch_value<R>(f: impl FnOnce() -> R) -> R {
    let _guard = BatchGuard::enter();
    f()
}

/// Handle form of [`batch`]: notifications are held until
/// [`commit`](Transaction::commit) or [`rollback`](Transaction::rollback)
/// (or drop, which commits).
///
/// Rollback does not restore previous signal values; it only closes the
/// batch, so effects still observe the writes made so far.
pub struct Transaction {
    guard: Option<BatchGuard>,
}

pub fn transaction() -> Transaction {
    Transaction {
        guard: Some(BatchGuard::enter()),
    }
}

impl Transaction {
    pub fn commit(mut self) {
        self.guard.take();
    }

    pub fn rollback(mut self) {
        log::debug!(
            target: log_target::BATCH,
            "transaction rolled back; signal values are kept"
        );
        self.guard.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{effect, signal};
    use std::cell::Cell;

    #[test]
    fn nested_batches_flush_once_at_outermost() {
        let s = signal(0);
        let runs = Rc::new(Cell::new(0));
        let e = effect({
            let s = s.clone();
            let runs = runs.clone();
            move || {
                s.get();
                runs.set(runs.get() + 1);
            }
        });
        batch(|| {
            s.set(1);
            batch(|| s.set(2));
            assert_eq!(runs.get(), 1);
            assert_eq!(reactive::batch_depth(), 1);
        });
        assert_eq!(runs.get(), 2);
        e.dispose();
    }

    #[test]
    fn transaction_commit_and_rollback_both_flush() {
        let s = signal(0);
        let last = Rc::new(Cell::new(-1));
        let e = effect({
            let s = s.clone();
            let last = last.clone();
            move || last.set(s.get())
        });

        let tx = transaction();
        s.set(5);
        assert_eq!(last.get(), 0);
        tx.commit();
        assert_eq!(last.get(), 5);

        let tx = transaction();
        s.set(9);
        tx.rollback();
        assert_eq!(last.get(), 9);
        assert_eq!(s.peek(), 9);
        e.dispose();
    }

    #[test]
    fn batch_value_returns_result() {
        let s = signal(2);
        let v = batch_value(|| {
            s.set(3);
            s.peek() * 2
        });
        assert_eq!(v, 6);
    }
}
