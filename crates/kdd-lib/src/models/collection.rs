//! Thread-safe keyed collection used to stage one sync cycle and to carry
//! query results.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Keyed collection of records guarded by a single mutex.
///
/// Keys are derived from identifying fields of the record so that two sync
/// cycles produce comparable key sets.
#[derive(Debug)]
pub struct Collection<T> {
    items: Mutex<HashMap<String, T>>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Collection<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a value. Fails with [`Error::DuplicateKey`] when `replace` is
    /// false and the key is already present.
    pub fn set(&self, key: impl Into<String>, value: T, replace: bool) -> Result<()> {
        let key = key.into();
        let mut items = self.lock();
        if !replace && items.contains_key(&key) {
            return Err(Error::DuplicateKey(key));
        }
        items.insert(key, value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Consume the collection and return its entries.
    pub fn into_entries(self) -> Vec<(String, T)> {
        self.items
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .collect()
    }
}

impl<T: Clone> Collection<T> {
    pub fn get(&self, key: &str) -> Option<T> {
        self.lock().get(key).cloned()
    }

    /// Snapshot of all values, in no particular order.
    pub fn to_list(&self) -> Vec<T> {
        self.lock().values().cloned().collect()
    }

    /// Snapshot of all key/value pairs, in no particular order.
    pub fn entries(&self) -> Vec<(String, T)> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Build a new collection holding the entries accepted by `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Collection<T>
    where
        F: Fn(&T) -> bool,
    {
        let filtered: HashMap<String, T> = self
            .lock()
            .iter()
            .filter(|(_, v)| predicate(v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Collection {
            items: Mutex::new(filtered),
        }
    }
}

impl<T> FromIterator<(String, T)> for Collection<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Collection {
            items: Mutex::new(iter.into_iter().collect()),
        }
    }
}

/// Structural equality: same size, and every key of `a` exists in `b` with a
/// value accepted by `eq`.
pub fn compare_collections<T, F>(a: &Collection<T>, b: &Collection<T>, eq: F) -> bool
where
    F: Fn(&T, &T) -> bool,
{
    if std::ptr::eq(a, b) {
        return true;
    }

    let a_items = a.lock();
    let b_items = b.lock();

    if a_items.len() != b_items.len() {
        return false;
    }

    a_items
        .iter()
        .all(|(key, a_val)| b_items.get(key).is_some_and(|b_val| eq(a_val, b_val)))
}
