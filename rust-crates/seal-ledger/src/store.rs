use crate::seal::Seal;
use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    PoisonError,
};
use tracing::debug;

/// Shared, explicitly owned seal collection.
///
/// Readers get an immutable snapshot; writers either replace the whole list
/// or flip a single seal's `is_unlocked`. The lock is never held across an
/// `.await`.
#[derive(Clone, Debug, Default)]
pub struct SealStore {
    inner: Arc<Mutex<StoreState>>,
}

#[derive(Debug)]
struct StoreState {
    seals: Arc<[Seal]>,
    generation: u64,
    published: u64,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            seals: Arc::from(Vec::new()),
            generation: 0,
            published: 0,
        }
    }
}

/// Handed out when an aggregation run starts; only the newest ticket may
/// publish.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncTicket {
    generation: u64,
}

impl SyncTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl SealStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Arc<[Seal]> {
        self.state().seals.clone()
    }

    pub fn get(&self, seal_id: u64) -> Option<Seal> {
        self.state().seals.iter().find(|s| s.id == seal_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().seals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    /// Generation of the run whose list is currently shown; 0 before the
    /// first publish.
    pub fn published_generation(&self) -> u64 {
        self.state().published
    }

    /// Supersedes every run that started earlier.
    pub fn begin_sync(&self) -> SyncTicket {
        let mut state = self.state();
        state.generation += 1;
        SyncTicket {
            generation: state.generation,
        }
    }

    /// Swaps in `seals` unless a newer run has started since `ticket` was
    /// issued. Returns whether the swap happened.
    pub fn publish(&self, ticket: SyncTicket, seals: Vec<Seal>) -> bool {
        let mut state = self.state();
        if ticket.generation != state.generation {
            debug!(
                ticket = ticket.generation,
                current = state.generation,
                "dropping superseded seal list"
            );
            return false;
        }
        state.seals = Arc::from(seals);
        state.published = ticket.generation;
        true
    }

    /// Sets `is_unlocked` on the matching seal, returning its previous value,
    /// or `None` when the seal is not loaded.
    pub fn mark_unlocked(&self, seal_id: u64) -> Option<bool> {
        self.set_unlocked(seal_id, true)
    }

    pub(crate) fn set_unlocked(&self, seal_id: u64, unlocked: bool) -> Option<bool> {
        let mut state = self.state();
        let index = state.seals.iter().position(|s| s.id == seal_id)?;
        let previous = state.seals[index].is_unlocked;
        if previous != unlocked {
            let mut seals = state.seals.to_vec();
            seals[index].is_unlocked = unlocked;
            state.seals = Arc::from(seals);
        }
        Some(previous)
    }

    /// Empties the collection and invalidates runs in flight.
    pub fn clear(&self) {
        let mut state = self.state();
        state.generation += 1;
        state.seals = Arc::from(Vec::new());
    }
}
