use crate::{CoreError, CoreResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use vrs_identifiers::ObjectId;

/// One mutex per object id, alive only while someone holds or waits for it.
///
/// The table itself is only locked long enough to fetch, insert or drop an entry. Clones of an
/// entry are only taken under the table lock, so a strong count of one on release means nobody
/// else is holding or waiting and the entry can go.
#[derive(Default)]
pub(crate) struct LockTable {
    locks: Mutex<HashMap<ObjectId, Arc<Mutex<()>>>>,
}

impl LockTable {
    /// Runs `f` while holding the lock of `object_id`.
    pub(crate) fn with_lock<R>(
        &self,
        object_id: &ObjectId,
        f: impl FnOnce() -> CoreResult<R>,
    ) -> CoreResult<R> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| CoreError::LockPoisoned)?;
            Arc::clone(locks.entry(*object_id).or_default())
        };

        let result = match lock.lock() {
            Ok(_guard) => f(),
            Err(_) => Err(CoreError::LockPoisoned),
        };
        self.release(object_id, lock);
        result
    }

    fn release(&self, object_id: &ObjectId, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks
            .get(object_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(object_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map_or(0, |locks| locks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn entries_are_dropped_once_released() {
        let table = LockTable::default();
        for _ in 0..100 {
            table.with_lock(&ObjectId::new(), || Ok(())).expect("locked");
        }
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn contended_lock_still_serialises_and_cleans_up() {
        let table = LockTable::default();
        let object_id = ObjectId::new();
        let inside = AtomicBool::new(false);
        let entered = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    barrier.wait();
                    for _ in 0..200 {
                        table
                            .with_lock(&object_id, || {
                                assert!(!inside.swap(true, Ordering::SeqCst), "two holders");
                                std::thread::yield_now();
                                entered.fetch_add(1, Ordering::SeqCst);
                                inside.store(false, Ordering::SeqCst);
                                Ok(())
                            })
                            .expect("locked");
                    }
                });
            }
        });

        assert_eq!(entered.load(Ordering::SeqCst), 1600);
        assert_eq!(table.len(), 0);
    }
}
