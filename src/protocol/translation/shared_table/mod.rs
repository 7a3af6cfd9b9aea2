//! Snapshot-and-swap publication of the translation table.
//!
//! Readers take an `Arc` snapshot under a short critical section and work on
//! it without any lock. Writers clone the current table and edit the clone
//! outside the lock, then publish it only when the edit succeeded, so a
//! refused edit is invisible and a reader never sees a half-applied one.
use super::table::TranslationTable;
use crate::core::{RuleSpec, TranslationRule};
use crate::error::{ConflictError, RuleLoadError};
use crate::protocol::transport::can_id::ArbitrationId;
use alloc::sync::Arc;
use core::cell::RefCell;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Table shared between the bridge runner and its editors.
pub struct SharedTable<M: RawMutex> {
    current: Mutex<M, RefCell<Arc<TranslationTable>>>,
}

impl<M: RawMutex> SharedTable<M> {
    /// Publish `table` as the initial rule set.
    pub fn new(table: TranslationTable) -> Self {
        Self {
            current: Mutex::new(RefCell::new(Arc::new(table))),
        }
    }

    /// Current table. The snapshot stays valid however the table is edited afterwards.
    pub fn snapshot(&self) -> Arc<TranslationTable> {
        self.current.lock(|cell| cell.borrow().clone())
    }

    /// Swap the whole rule set for `specs` (new epoch).
    pub fn load(&self, specs: &[RuleSpec]) -> Result<(), RuleLoadError> {
        self.edit(|table| table.reload(specs))
    }

    /// Add a rule.
    pub fn insert(&self, rule: TranslationRule) -> Result<(), ConflictError> {
        self.edit(|table| table.insert(rule))
    }

    /// Replace the rules of `rule`'s `(source, destination)` pair.
    pub fn replace(&self, rule: TranslationRule) -> Result<(), ConflictError> {
        self.edit(|table| table.replace(rule))
    }

    /// Remove the rules of a `(source, destination)` pair.
    pub fn remove(&self, source: ArbitrationId, destination: ArbitrationId) -> bool {
        self.edit(|table| {
            if table.remove(source, destination) {
                Ok(())
            } else {
                Err(())
            }
        })
        .is_ok()
    }

    /// Drop every rule (new epoch).
    pub fn clear(&self) {
        let _ = self.edit(|table| {
            table.clear();
            Ok::<(), ()>(())
        });
    }

    /// Clone, edit, publish on success.
    ///
    /// The clone and the edit run outside the lock. Publication only happens
    /// if no other writer published in between; otherwise the edit is
    /// replayed on the newer table.
    fn edit<E, F>(&self, mut apply: F) -> Result<(), E>
    where
        F: FnMut(&mut TranslationTable) -> Result<(), E>,
    {
        loop {
            let base = self.snapshot();
            let mut next = TranslationTable::clone(&base);
            apply(&mut next)?;

            let swap = self.current.lock(|cell| {
                let mut current = cell.borrow_mut();
                if Arc::ptr_eq(&*current, &base) {
                    Ok(core::mem::replace(&mut *current, Arc::new(next)))
                } else {
                    Err(next)
                }
            });
            // Both the replaced table and a stale edit are dropped here, unlocked.
            match swap {
                Ok(_) => return Ok(()),
                Err(_) => {
                    #[cfg(feature = "defmt")]
                    defmt::debug!("Rule table changed during edit, retrying");
                }
            }
        }
    }
}

impl<M: RawMutex> Default for SharedTable<M> {
    fn default() -> Self {
        Self::new(TranslationTable::new())
    }
}
