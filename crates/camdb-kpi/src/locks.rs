//! Per-scope serialization point.
//!
//! Every scope gets one async gate. Requests take a ticket before waiting on
//! the gate; a recomputation records the highest ticket issued when it
//! started. A waiter whose ticket is covered by a finished recomputation
//! reuses that result instead of reading the posts again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use camdb_core::{KpiCategory, Scope};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

#[derive(Debug, Default)]
pub(crate) struct GateState {
    /// Highest ticket covered by a successful recomputation.
    completed: u64,
    last_values: Option<Vec<(KpiCategory, i64)>>,
}

impl GateState {
    /// Values of a recomputation that started after `ticket` was issued.
    pub(crate) fn covering(&self, ticket: u64) -> Option<&[(KpiCategory, i64)]> {
        if self.completed >= ticket {
            self.last_values.as_deref()
        } else {
            None
        }
    }

    pub(crate) fn record(&mut self, started_at: u64, values: Vec<(KpiCategory, i64)>) {
        if started_at >= self.completed {
            self.completed = started_at;
            self.last_values = Some(values);
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    requested: AtomicU64,
    gate: AsyncMutex<GateState>,
}

#[derive(Debug, Default)]
pub(crate) struct ScopeLocks {
    slots: Mutex<HashMap<Scope, Arc<Slot>>>,
}

impl ScopeLocks {
    /// Registers a request for `scope` and returns its ticket.
    pub(crate) fn ticket(self: &Arc<Self>, scope: Scope) -> Ticket {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(scope).or_default())
        };
        let number = slot.requested.fetch_add(1, Ordering::SeqCst) + 1;
        Ticket {
            locks: Arc::clone(self),
            scope,
            slot,
            number,
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A pending request on one scope. Dropping it releases the slot once no
/// other request holds it.
pub(crate) struct Ticket {
    locks: Arc<ScopeLocks>,
    scope: Scope,
    slot: Arc<Slot>,
    number: u64,
}

impl Ticket {
    pub(crate) fn number(&self) -> u64 {
        self.number
    }

    /// Waits for exclusive access to the scope.
    pub(crate) async fn acquire(&self) -> MutexGuard<'_, GateState> {
        self.slot.gate.lock().await
    }

    /// Highest ticket issued so far; read after acquiring the gate and before
    /// reading posts.
    pub(crate) fn latest_requested(&self) -> u64 {
        self.slot.requested.load(Ordering::SeqCst)
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut slots = self
            .locks
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here.
        if Arc::strong_count(&self.slot) <= 2 {
            slots.remove(&self.scope);
        }
    }
}
