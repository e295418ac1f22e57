//! In-process token store.
//!
//! Holds hash, list and set values behind one mutex. Expired keys are
//! dropped when touched, and reclaimed in bulk by [`MemoryStore::purge_expired`]
//! or the background task started with [`MemoryStore::spawn_reaper`].
//! The mutex is never held across an await point, so every primitive is
//! atomic with respect to the others.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::{resolve_range, Fields, StoreResult, TokenStore};
use crate::error::StoreError;

#[derive(Debug, Clone)]
enum Value {
    Hash(Fields),
    List(VecDeque<String>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// In-memory [`TokenStore`].
///
/// Cheaply cloneable; all clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        match self.entries.lock() {
            Ok(entries) => entries.values().filter(|e| !e.is_expired(now)).count(),
            Err(poisoned) => poisoned.into_inner().values().filter(|e| !e.is_expired(now)).count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every expired key and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        purge(&self.entries)
    }

    /// Starts a task that purges expired keys every `period`.
    ///
    /// The task ends when the returned [`Reaper`] is shut down or dropped,
    /// or once every clone of the store is gone.
    pub fn spawn_reaper(&self, period: Duration) -> Reaper {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        let entries = Arc::downgrade(&self.entries);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => return,
                }

                let Some(entries) = entries.upgrade() else {
                    return;
                };
                let purged = purge(&entries);
                if purged > 0 {
                    tracing::debug!(purged = purged, "Reclaimed expired token store keys");
                }
            }
        });

        Reaper { shutdown_tx }
    }

    #[cfg(test)]
    fn raw_len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

/// Handle to the expiry task started by [`MemoryStore::spawn_reaper`]
#[derive(Debug)]
pub struct Reaper {
    shutdown_tx: watch::Sender<()>,
}

impl Reaper {
    /// Stops the task. Dropping the handle has the same effect.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn purge(entries: &Mutex<HashMap<String, Entry>>) -> usize {
    let mut entries = entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before - entries.len()
}

/// Returns the live entry for `key`, evicting it first if it has expired.
fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|e| e.is_expired(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType { key: key.to_string() }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get_hash(&self, key: &str) -> StoreResult<Option<Fields>> {
        let mut entries = self.lock()?;
        match live(&mut entries, key) {
            None => Ok(None),
            Some(Entry { value: Value::Hash(fields), .. }) => Ok(Some(fields.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_hash(&self, key: &str, fields: Fields, ttl_seconds: u64) -> StoreResult<()> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Hash(fields),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_seconds)),
            },
        );
        Ok(())
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        let mut entries = self.lock()?;
        match live(&mut entries, key) {
            None => Ok(false),
            Some(Entry { value: Value::Hash(fields), .. }) => {
                fields.insert(field.to_string(), value.to_string());
                Ok(true)
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn list_push_front(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.lock()?;
        if live(&mut entries, key).is_none() {
            entries.insert(
                key.to_string(),
                Entry { value: Value::List(VecDeque::new()), expires_at: None },
            );
        }
        match entries.get_mut(key) {
            Some(Entry { value: Value::List(list), .. }) => {
                list.push_front(value.to_string());
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let mut entries = self.lock()?;
        let list = match live(&mut entries, key) {
            None => return Ok(Vec::new()),
            Some(Entry { value: Value::List(list), .. }) => list,
            Some(_) => return Err(wrong_type(key)),
        };

        let removed: Vec<String> = match resolve_range(list.len(), start, stop) {
            Some((from, to)) => {
                let mut removed: Vec<String> = list.drain(..from).collect();
                removed.extend(list.split_off(to + 1 - from));
                removed
            }
            None => list.drain(..).collect(),
        };
        if list.is_empty() {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let mut entries = self.lock()?;
        match live(&mut entries, key) {
            None => Ok(Vec::new()),
            Some(Entry { value: Value::List(list), .. }) => Ok(resolve_range(list.len(), start, stop)
                .map(|(from, to)| list.range(from..=to).cloned().collect())
                .unwrap_or_default()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_add(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.lock()?;
        if live(&mut entries, key).is_none() {
            entries.insert(
                key.to_string(),
                Entry { value: Value::Set(HashSet::new()), expires_at: None },
            );
        }
        match entries.get_mut(key) {
            Some(Entry { value: Value::Set(set), .. }) => {
                set.insert(value.to_string());
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut entries = self.lock()?;
        match live(&mut entries, key) {
            None => Ok(Vec::new()),
            Some(Entry { value: Value::Set(set), .. }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_remove(&self, key: &str, values: &[String]) -> StoreResult<()> {
        let mut entries = self.lock()?;
        let set = match live(&mut entries, key) {
            None => return Ok(()),
            Some(Entry { value: Value::Set(set), .. }) => set,
            Some(_) => return Err(wrong_type(key)),
        };

        for value in values {
            set.remove(value);
        }
        if set.is_empty() {
            entries.remove(key);
        }
        Ok(())
    }

    async fn set_clear(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.lock()?;
        match live(&mut entries, key) {
            None => Ok(()),
            Some(Entry { value: Value::Set(_), .. }) => {
                entries.remove(key);
                Ok(())
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        let mut entries = self.lock()?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }
}
