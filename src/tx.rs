//! Transaction engine: id allocation, per-transaction command counters,
//! active-set snapshots, and the commit log consulted by MVCC visibility.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::ids::{CommandId, TxId};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TxState {
    Active,
    Committed,
    Aborted,
}

/// A single transaction. Effects of transaction `T` are visible to this
/// transaction iff `T.id < self.id`, `T.id` is not in `self.snapshot`, and
/// `T` committed.
#[derive(Debug)]
pub struct Transaction {
    id: TxId,
    command_id: AtomicU32,
    snapshot: BTreeSet<TxId>,
    should_abort: AtomicBool,
}

impl Transaction {
    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn command_id(&self) -> CommandId {
        self.command_id.load(Ordering::Acquire)
    }

    /// Ends the current command; subsequent old-view reads see the state as
    /// of the new command's start.
    pub fn advance_command(&self) {
        self.command_id.fetch_add(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> &BTreeSet<TxId> {
        &self.snapshot
    }

    /// Cooperative cancellation flag, checked at every cursor pull.
    pub fn set_should_abort(&self) {
        self.should_abort.store(true, Ordering::Release);
    }

    pub fn should_abort(&self) -> bool {
        self.should_abort.load(Ordering::Acquire)
    }

    /// Committed-visibility of another transaction's effects.
    pub fn sees(&self, other: TxId, engine: &Engine) -> bool {
        other < self.id && !self.snapshot.contains(&other) && engine.is_committed(other)
    }
}

/// Process-wide transaction engine.
#[derive(Debug)]
pub struct Engine {
    counter: AtomicU64,
    /// Active transaction id mapped to its GC floor contribution, the
    /// smallest id in `snapshot ∪ {id}`.
    active: Mutex<BTreeMap<TxId, TxId>>,
    clog: RwLock<HashMap<TxId, TxState>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            active: Mutex::new(BTreeMap::new()),
            clog: RwLock::new(HashMap::new()),
        }
    }

    /// Allocates a fresh id and snapshots the currently active set.
    pub fn begin(&self) -> Arc<Transaction> {
        let mut active = self.active.lock();
        let id = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot: BTreeSet<TxId> = active.keys().copied().collect();
        let floor = snapshot.iter().next().copied().unwrap_or(id).min(id);
        active.insert(id, floor);
        self.clog.write().insert(id, TxState::Active);
        debug!(tx_id = id, "transaction started");
        Arc::new(Transaction {
            id,
            command_id: AtomicU32::new(0),
            snapshot,
            should_abort: AtomicBool::new(false),
        })
    }

    pub fn commit(&self, tx: &Transaction) {
        self.active.lock().remove(&tx.id);
        self.clog.write().insert(tx.id, TxState::Committed);
        debug!(tx_id = tx.id, "transaction committed");
    }

    pub fn abort(&self, tx: &Transaction) {
        self.active.lock().remove(&tx.id);
        self.clog.write().insert(tx.id, TxState::Aborted);
        debug!(tx_id = tx.id, "transaction aborted");
    }

    pub fn state(&self, id: TxId) -> TxState {
        self.clog
            .read()
            .get(&id)
            .copied()
            .unwrap_or(TxState::Aborted)
    }

    pub fn is_committed(&self, id: TxId) -> bool {
        self.state(id) == TxState::Committed
    }

    pub fn is_aborted(&self, id: TxId) -> bool {
        self.state(id) == TxState::Aborted
    }

    /// Smallest id whose outcome might still be invisible to some live
    /// reader. Versions strictly below this are settled for everyone.
    pub fn gc_floor(&self) -> TxId {
        let active = self.active.lock();
        active
            .values()
            .min()
            .copied()
            .unwrap_or_else(|| self.counter.load(Ordering::Acquire) + 1)
    }

    /// Seeds the id counter from recovered state.
    pub fn seed_next_id(&self, max_seen: TxId) {
        self.counter.fetch_max(max_seen, Ordering::AcqRel);
    }
}
