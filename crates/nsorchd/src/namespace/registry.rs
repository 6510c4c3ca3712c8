//! Concurrent namespace registry.
//!
//! Two lock levels:
//!
//! - the registry lock (`parking_lot::Mutex`) guards map membership only and
//!   is never held across an `.await`
//! - each entry has its own `tokio::sync::Mutex`, held by the caller for the
//!   whole critical section, including backend I/O
//!
//! Every acquisition re-validates the map slot after taking the entry lock.
//! An entry that was deleted, or deleted and recreated, while the caller was
//! waiting is reported as not found.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as EntryMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::info::NamespaceInfo;
use crate::error::RegistryError;

type Entry = Arc<EntryMutex<NamespaceInfo>>;

/// A locked namespace entry. Dropping it releases the entry lock.
pub type NamespaceGuard = OwnedMutexGuard<NamespaceInfo>;

#[derive(Debug, Default)]
pub struct NamespaceRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    overwritten: AtomicU64,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, name: &str) -> Option<Entry> {
        self.entries.lock().get(name).cloned()
    }

    fn is_current(&self, name: &str, entry: &Entry) -> bool {
        self.entries
            .lock()
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
    }

    /// Looks up and locks the live entry for `name`.
    ///
    /// Returns `None` if the namespace is unknown or the entry went stale
    /// while waiting for its lock. Callers decide whether to retry.
    pub async fn get_locked(&self, name: &str) -> Option<NamespaceGuard> {
        let entry = self.lookup(name)?;
        let guard = Arc::clone(&entry).lock_owned().await;
        if !self.is_current(name, &entry) {
            debug!(namespace = name, "Namespace entry went stale while locking");
            return None;
        }
        Some(guard)
    }

    /// Creates a fresh entry for `name`, publishes it, and returns it locked.
    ///
    /// Replaces any existing mapping for the name; a replaced entry is
    /// logged and counted in [`overwritten`](Self::overwritten).
    pub async fn create_locked(&self, name: &str) -> NamespaceGuard {
        let entry: Entry = Arc::new(EntryMutex::new(NamespaceInfo::new(name)));
        // Not yet published, so the lock is uncontended.
        let guard = Arc::clone(&entry).lock_owned().await;

        let previous = self.entries.lock().insert(name.to_string(), entry);
        if let Some(previous) = previous {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
            warn!(
                namespace = name,
                in_use = Arc::strong_count(&previous) > 1,
                "Replaced an existing namespace entry; its backend objects may leak"
            );
        }
        guard
    }

    /// Looks up, locks, and unpublishes the live entry for `name`.
    ///
    /// The caller owns the returned entry and must release its backend
    /// objects before dropping the guard.
    pub async fn delete_locked(&self, name: &str) -> Option<NamespaceGuard> {
        let entry = self.lookup(name)?;
        let guard = Arc::clone(&entry).lock_owned().await;

        let mut entries = self.entries.lock();
        match entries.get(name) {
            Some(current) if Arc::ptr_eq(current, &entry) => {
                entries.remove(name);
            }
            _ => {
                debug!(namespace = name, "Namespace entry went stale while locking");
                return None;
            }
        }
        drop(entries);
        Some(guard)
    }

    /// Polls [`get_locked`](Self::get_locked) every `poll_interval` until it
    /// succeeds or `timeout` elapses.
    pub async fn wait_locked(
        &self,
        name: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<NamespaceGuard, RegistryError> {
        let poll = async {
            loop {
                if let Some(guard) = self.get_locked(name).await {
                    return guard;
                }
                tokio::time::sleep(poll_interval).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| RegistryError::Timeout {
                namespace: name.to_string(),
                waited: timeout,
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Registered namespace names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of times `create_locked` replaced an existing entry.
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}
