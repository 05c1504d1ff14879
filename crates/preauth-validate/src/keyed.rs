//! Per-key serialized state.
//!
//! The outer map lock is held only long enough to fetch or create a key's
//! cell. Work on one key then runs under that key's own lock, so appends for
//! the same patient or provider serialize while different keys proceed in
//! parallel.
//!
//! Cells only go away through [`KeyedStore::evict_where`], which callers run
//! as a periodic sweep so keys that stop receiving appends do not linger.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use preauth_contracts::error::{PreauthError, PreauthResult};

#[derive(Debug)]
pub struct KeyedStore<T> {
    name: &'static str,
    cells: Mutex<HashMap<String, Arc<Mutex<T>>>>,
}

impl<T: Default> KeyedStore<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn cell(&self, key: &str) -> PreauthResult<Arc<Mutex<T>>> {
        let mut cells = self
            .cells
            .lock()
            .map_err(|e| PreauthError::store(format!("{} index lock poisoned: {e}", self.name)))?;
        Ok(Arc::clone(cells.entry(key.to_string()).or_default()))
    }

    /// Run `f` with exclusive access to `key`'s state, creating it if absent.
    pub fn with<R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> PreauthResult<R> {
        let cell = self.cell(key)?;
        let mut state = cell
            .lock()
            .map_err(|e| PreauthError::store(format!("{} entry '{key}' lock poisoned: {e}", self.name)))?;
        Ok(f(&mut state))
    }

    /// Read `key`'s state without creating it.
    pub fn peek<R>(&self, key: &str, f: impl FnOnce(&T) -> R) -> PreauthResult<Option<R>> {
        let cell = {
            let cells = self
                .cells
                .lock()
                .map_err(|e| PreauthError::store(format!("{} index lock poisoned: {e}", self.name)))?;
            match cells.get(key) {
                Some(cell) => Arc::clone(cell),
                None => return Ok(None),
            }
        };
        let state = cell
            .lock()
            .map_err(|e| PreauthError::store(format!("{} entry '{key}' lock poisoned: {e}", self.name)))?;
        Ok(Some(f(&state)))
    }

    pub fn key_count(&self) -> PreauthResult<usize> {
        let cells = self
            .cells
            .lock()
            .map_err(|e| PreauthError::store(format!("{} index lock poisoned: {e}", self.name)))?;
        Ok(cells.len())
    }

    /// Let `prune` trim every key's state, then drop keys it reports as
    /// evictable. A cell some caller is still holding is kept.
    ///
    /// Returns the number of keys removed.
    pub fn evict_where(&self, mut prune: impl FnMut(&mut T) -> bool) -> PreauthResult<usize> {
        let mut cells = self
            .cells
            .lock()
            .map_err(|e| PreauthError::store(format!("{} index lock poisoned: {e}", self.name)))?;
        let before = cells.len();
        let mut poisoned = None;
        cells.retain(|key, cell| {
            let mut state = match cell.lock() {
                Ok(state) => state,
                Err(e) => {
                    poisoned.get_or_insert_with(|| format!("{} entry '{key}' lock poisoned: {e}", self.name));
                    return true;
                }
            };
            let evictable = prune(&mut state);
            drop(state);
            // New handles are only cloned under the index lock, which we hold.
            !(evictable && Arc::strong_count(cell) == 1)
        });
        match poisoned {
            Some(reason) => Err(PreauthError::store(reason)),
            None => Ok(before - cells.len()),
        }
    }
}

/// Decides when a store is due for its next sweep.
#[derive(Debug, Default)]
pub struct SweepClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl SweepClock {
    /// True at most once per `interval`; the first call is always due.
    pub fn due(&self, now: DateTime<Utc>, interval: Duration) -> PreauthResult<bool> {
        let mut last = self
            .last
            .lock()
            .map_err(|e| PreauthError::store(format!("sweep clock lock poisoned: {e}")))?;
        match *last {
            Some(at) if now < at + interval => Ok(false),
            _ => {
                *last = Some(now);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evict_where_drops_only_evictable_keys() {
        let store: KeyedStore<Vec<u32>> = KeyedStore::new("test");
        store.with("a", |v| v.push(1)).unwrap();
        store.with("b", |v| v.push(50)).unwrap();

        let removed = store
            .evict_where(|v| {
                v.retain(|n| *n > 10);
                v.is_empty()
            })
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.key_count().unwrap(), 1);
        assert!(store.peek("a", |_| ()).unwrap().is_none(), "emptied key should be gone");
        assert_eq!(store.peek("b", |v| v.clone()).unwrap(), Some(vec![50]));
    }

    #[test]
    fn test_evict_where_keeps_cells_still_in_use() {
        let store: KeyedStore<Vec<u32>> = KeyedStore::new("test");
        let held = store.cell("a").unwrap();

        let removed = store.evict_where(|_| true).unwrap();

        assert_eq!(removed, 0, "a cell with an outstanding handle must survive");
        drop(held);
        assert_eq!(store.evict_where(|_| true).unwrap(), 1);
    }

    #[test]
    fn test_sweep_clock_fires_once_per_interval() {
        let clock = SweepClock::default();
        let t0 = Utc::now();
        assert!(clock.due(t0, Duration::hours(24)).unwrap());
        assert!(!clock.due(t0 + Duration::hours(1), Duration::hours(24)).unwrap());
        assert!(clock.due(t0 + Duration::hours(25), Duration::hours(24)).unwrap());
    }
}
