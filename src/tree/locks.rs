//! Per-folder mutual exclusion
//!
//! Mutations that create or replace a child take the lock of the child's
//! parent folder, so sibling-name checks and inserts are atomic without a
//! global lock. Slots are reference counted and vanish once no caller holds
//! them.

use crate::path::{CanonicalPath, TenantRoot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// Dead slots are swept once the table grows past this many entries
const SWEEP_THRESHOLD: usize = 256;

type FolderKey = (TenantRoot, CanonicalPath);

#[derive(Debug, Default)]
pub(crate) struct FolderLocks {
    slots: Mutex<HashMap<FolderKey, Weak<Mutex<()>>>>,
}

impl FolderLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock of `folder`
    ///
    /// Callers must not nest two folder locks.
    pub(crate) fn with_lock<T>(
        &self,
        root: &TenantRoot,
        folder: &CanonicalPath,
        f: impl FnOnce() -> T,
    ) -> T {
        let slot = self.slot(root, folder);
        let _guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        f()
    }

    fn slot(&self, root: &TenantRoot, folder: &CanonicalPath) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let key = (root.clone(), folder.clone());

        if let Some(existing) = slots.get(&key).and_then(Weak::upgrade) {
            return existing;
        }

        if slots.len() >= SWEEP_THRESHOLD {
            slots.retain(|_, slot| slot.strong_count() > 0);
        }

        let slot = Arc::new(Mutex::new(()));
        slots.insert(key, Arc::downgrade(&slot));
        slot
    }

    #[cfg(test)]
    fn live_slots(&self) -> usize {
        let slots = self.slots.lock().unwrap();
        slots.values().filter(|s| s.strong_count() > 0).count()
    }
}
