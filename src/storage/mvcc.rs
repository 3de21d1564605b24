//! MVCC version chains.
//!
//! Each logical record is a singly-linked chain of versions, newest first.
//! A version carries the creating transaction (`cre`), the expiring
//! transaction (`exp`, none meaning forever), and the payload. Committed
//! versions are immutable; only the owning transaction mutates the payload
//! of its own uncommitted head version, within the command that created it.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::error::{GraphError, Result};
use crate::ids::{CommandId, Gid, TxId};
use crate::tx::{Engine, Transaction};

/// Which state a reader observes within the current command: `Old` is the
/// state at command start, `New` includes current-command writes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum View {
    Old,
    New,
}

#[derive(Debug)]
pub struct Record<T> {
    cre: (TxId, CommandId),
    exp: Mutex<Option<(TxId, CommandId)>>,
    data: RwLock<T>,
    prev: RwLock<Option<Arc<Record<T>>>>,
}

impl<T> Record<T> {
    fn new(cre: (TxId, CommandId), data: T, prev: Option<Arc<Record<T>>>) -> Self {
        Self {
            cre,
            exp: Mutex::new(None),
            data: RwLock::new(data),
            prev: RwLock::new(prev),
        }
    }

    pub fn cre(&self) -> (TxId, CommandId) {
        self.cre
    }

    pub fn exp(&self) -> Option<(TxId, CommandId)> {
        *self.exp.lock()
    }

    pub fn data(&self) -> RwLockReadGuard<'_, T> {
        self.data.read()
    }

    /// Mutable payload access for the owning transaction's current command.
    pub fn data_mut(&self) -> parking_lot::RwLockWriteGuard<'_, T> {
        self.data.write()
    }

    fn prev_version(&self) -> Option<Arc<Record<T>>> {
        self.prev.read().clone()
    }

    /// Whether this version's creation is visible under `view`.
    fn cre_visible(&self, tx: &Transaction, engine: &Engine, view: View) -> bool {
        if self.cre.0 == tx.id() {
            match view {
                View::New => true,
                View::Old => self.cre.1 < tx.command_id(),
            }
        } else {
            tx.sees(self.cre.0, engine)
        }
    }

    /// Whether this version's expiration is in effect under `view`.
    pub fn expired_for(&self, tx: &Transaction, engine: &Engine, view: View) -> bool {
        match self.exp() {
            None => false,
            Some((etx, ecmd)) => {
                if etx == tx.id() {
                    match view {
                        View::New => true,
                        View::Old => ecmd < tx.command_id(),
                    }
                } else {
                    tx.sees(etx, engine)
                }
            }
        }
    }
}

/// Version chain of one logical vertex or edge.
#[derive(Debug)]
pub struct VersionList<T> {
    gid: Gid,
    head: RwLock<Arc<Record<T>>>,
}

impl<T: Clone> VersionList<T> {
    /// Creates a fresh chain with a single version visible only to `tx`.
    pub fn new(gid: Gid, payload: T, tx: &Transaction) -> Self {
        let record = Arc::new(Record::new((tx.id(), tx.command_id()), payload, None));
        Self {
            gid,
            head: RwLock::new(record),
        }
    }

    pub fn gid(&self) -> Gid {
        self.gid
    }

    /// Resolves the old (pre-command) and new (own latest write) versions
    /// for `tx`, newest-first along the chain.
    pub fn find_set_old_new(
        &self,
        tx: &Transaction,
        engine: &Engine,
    ) -> (Option<Arc<Record<T>>>, Option<Arc<Record<T>>>) {
        let mut new_version = None;
        let mut old_version = None;
        let mut cursor = Some(self.head.read().clone());
        while let Some(record) = cursor {
            if new_version.is_none() && record.cre.0 == tx.id() {
                new_version = Some(record.clone());
            }
            if record.cre_visible(tx, engine, View::Old) {
                old_version = Some(record);
                break;
            }
            cursor = record.prev_version();
        }
        (old_version, new_version)
    }

    /// The version a reader under `view` observes, or none when the record
    /// does not exist (never created, not yet visible, or expired).
    pub fn visible_version(
        &self,
        tx: &Transaction,
        engine: &Engine,
        view: View,
    ) -> Option<Arc<Record<T>>> {
        let (old_version, new_version) = self.find_set_old_new(tx, engine);
        let version = match view {
            View::New => new_version.or(old_version),
            View::Old => old_version,
        }?;
        if version.expired_for(tx, engine, view) {
            None
        } else {
            Some(version)
        }
    }

    /// Copy-on-write update: returns the version owned by `tx`'s current
    /// command, creating it from the newest visible payload if needed.
    pub fn update(&self, tx: &Transaction, engine: &Engine) -> Result<Arc<Record<T>>> {
        let mut head = self.head.write();
        let top = Self::first_live(&head, engine).ok_or(GraphError::RecordDeleted)?;
        Self::check_write_conflict(&top, tx, engine)?;
        if top.cre == (tx.id(), tx.command_id()) {
            return Ok(top);
        }
        let payload = top.data.read().clone();
        let record = Arc::new(Record::new(
            (tx.id(), tx.command_id()),
            payload,
            Some(head.clone()),
        ));
        *head = record.clone();
        Ok(record)
    }

    /// Marks the record expired by `tx`.
    pub fn remove(&self, tx: &Transaction, engine: &Engine) -> Result<()> {
        let head = self.head.write();
        let top = Self::first_live(&head, engine).ok_or(GraphError::RecordDeleted)?;
        Self::check_write_conflict(&top, tx, engine)?;
        *top.exp.lock() = Some((tx.id(), tx.command_id()));
        Ok(())
    }

    /// First version from the head not created by an aborted transaction.
    fn first_live(head: &Arc<Record<T>>, engine: &Engine) -> Option<Arc<Record<T>>> {
        let mut cursor = Some(head.clone());
        while let Some(record) = cursor {
            if !engine.is_aborted(record.cre.0) {
                return Some(record);
            }
            cursor = record.prev_version();
        }
        None
    }

    /// A mutator conflicts when the newest live version was written by a
    /// transaction outside its snapshot, or carries a concurrent expiry.
    fn check_write_conflict(
        top: &Arc<Record<T>>,
        tx: &Transaction,
        engine: &Engine,
    ) -> Result<()> {
        if top.cre.0 != tx.id() && !tx.sees(top.cre.0, engine) {
            return Err(GraphError::Serialization);
        }
        let mut exp = top.exp.lock();
        match *exp {
            None => Ok(()),
            Some((etx, _)) if etx == tx.id() => Err(GraphError::RecordDeleted),
            Some((etx, _)) if engine.is_aborted(etx) => {
                // Lazy rollback of an aborted expiry.
                *exp = None;
                Ok(())
            }
            Some((etx, _)) if tx.sees(etx, engine) => Err(GraphError::RecordDeleted),
            Some(_) => Err(GraphError::Serialization),
        }
    }

    /// Physically removes versions no transaction at or above `floor` can
    /// observe. Returns true when the whole chain is dead.
    pub fn prune(&self, engine: &Engine, floor: TxId) -> bool {
        let mut head = self.head.write();
        // Unlink aborted versions at the head.
        loop {
            if engine.is_aborted(head.cre.0) {
                match head.prev_version() {
                    Some(prev) => *head = prev,
                    None => return true,
                }
            } else {
                break;
            }
        }
        let mut cursor = head.clone();
        loop {
            if cursor.cre.0 < floor && engine.is_committed(cursor.cre.0) {
                // Everything older is shadowed for every live and future
                // reader.
                *cursor.prev.write() = None;
                if let Some((etx, _)) = cursor.exp() {
                    if etx < floor && engine.is_committed(etx) {
                        return Arc::ptr_eq(&cursor, &head);
                    }
                }
                return false;
            }
            let next = cursor.prev_version();
            match next {
                Some(prev) if engine.is_aborted(prev.cre.0) => {
                    let skip = prev.prev_version();
                    *cursor.prev.write() = skip;
                }
                Some(prev) => cursor = prev,
                None => return false,
            }
        }
    }
}
