use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use accord_types::{CommittedTransition, LinearId, RecordAndRef, RecordRef, TransitionId};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::journal::Journal;
use crate::query::{CurrentRecords, RecordQuery};
use crate::{VaultError, VaultResult};

/// Result of [`RecordStore::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The transition's content hash was already present; nothing changed.
    AlreadyApplied,
}

/// Local index of committed records.
///
/// `apply` is the only mutation entry point and is idempotent per
/// transition id.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Mark the transition's input consumed and install its output as the
    /// current version for its `linear_id`.
    async fn apply(&self, committed: &CommittedTransition) -> VaultResult<ApplyOutcome>;

    /// Unconsumed record versions matching `query`.
    fn current(&self, query: &RecordQuery) -> VaultResult<CurrentRecords>;

    /// Current version of one record, if known locally.
    fn latest(&self, linear_id: &LinearId) -> VaultResult<Option<RecordAndRef>>;

    fn transition(&self, id: &TransitionId) -> VaultResult<Option<CommittedTransition>>;

    /// Transition that consumed `reference`, if one is recorded locally.
    fn consumed_by(&self, reference: &RecordRef) -> VaultResult<Option<TransitionId>>;

    fn is_consumed(&self, reference: &RecordRef) -> VaultResult<bool> {
        Ok(self.consumed_by(reference)?.is_some())
    }
}

/// In-memory index with an optional durable journal behind it.
///
/// Applies to the same `linear_id` are serialized by a per-record lock that
/// lives only while some apply holds it.
pub struct Vault {
    state: RwLock<VaultState>,
    locks: DashMap<LinearId, Arc<Mutex<()>>>,
    journal: Option<Journal>,
}

#[derive(Default)]
struct VaultState {
    current: BTreeMap<LinearId, RecordAndRef>,
    consumed: HashMap<RecordRef, TransitionId>,
    transitions: HashMap<TransitionId, CommittedTransition>,
    created: HashMap<LinearId, TransitionId>,
}

impl VaultState {
    fn check(&self, committed: &CommittedTransition) -> VaultResult<()> {
        let Some(input) = committed.input_ref() else {
            return self.check_create(committed);
        };
        match self.consumed.get(&input) {
            Some(consumed_by) if *consumed_by != committed.id => {
                Err(VaultError::DoubleConsumption {
                    consumed: input,
                    consumed_by: *consumed_by,
                    transition: committed.id,
                })
            }
            _ => Ok(()),
        }
    }

    /// A create may only introduce a new `linear_id`. When later versions
    /// arrived first, the create must be the one they descend from.
    fn check_create(&self, committed: &CommittedTransition) -> VaultResult<()> {
        let linear_id = committed.linear_id();
        let reused = |created_by: TransitionId| VaultError::LinearIdReused {
            linear_id,
            created_by,
            transition: committed.id,
        };
        if let Some(created_by) = self.created.get(&linear_id) {
            if *created_by != committed.id {
                return Err(reused(*created_by));
            }
        }
        match self.current.get(&linear_id) {
            Some(current) if !self.consumed.contains_key(&committed.output_ref()) => {
                Err(reused(current.reference.produced_by))
            }
            _ => Ok(()),
        }
    }

    fn insert(&mut self, committed: CommittedTransition) {
        match committed.input_ref() {
            Some(input) => {
                self.consumed.insert(input, committed.id);
            }
            None => {
                self.created.insert(committed.linear_id(), committed.id);
            }
        }
        let output = committed.output();
        // A later transition may already have consumed this output when
        // commits arrive out of order; it must not become current again.
        if !self.consumed.contains_key(&output.reference) {
            self.current.insert(output.reference.linear_id, output);
        }
        self.transitions.insert(committed.id, committed);
    }
}

impl Vault {
    /// Volatile vault; contents are lost when dropped.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(VaultState::default()),
            locks: DashMap::new(),
            journal: None,
        }
    }

    /// Durable vault backed by the journal at `path`, replaying any
    /// transitions it already holds.
    pub async fn open(path: impl AsRef<Path>) -> VaultResult<Self> {
        let (journal, existing) = Journal::open(path).await?;
        let mut state = VaultState::default();
        let replayed = existing.len();
        for committed in existing {
            if state.transitions.contains_key(&committed.id) {
                continue;
            }
            state.check(&committed)?;
            state.insert(committed);
        }
        info!(
            path = %journal.path().display(),
            replayed,
            current = state.current.len(),
            "vault journal replayed"
        );
        Ok(Self {
            state: RwLock::new(state),
            locks: DashMap::new(),
            journal: Some(journal),
        })
    }

    pub fn is_durable(&self) -> bool {
        self.journal.is_some()
    }

    pub fn transition_count(&self) -> VaultResult<usize> {
        Ok(self.read()?.transitions.len())
    }

    fn lock_for(&self, linear_id: LinearId) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(linear_id).or_default().value())
    }

    /// Drop the lock for `linear_id` once no apply holds a handle to it.
    fn release_lock(&self, linear_id: &LinearId) {
        self.locks
            .remove_if(linear_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Caller holds the lock for the transition's `linear_id`.
    async fn apply_locked(&self, committed: &CommittedTransition) -> VaultResult<ApplyOutcome> {
        {
            let state = self.read()?;
            if state.transitions.contains_key(&committed.id) {
                debug!(transition = %committed.id, "transition already applied");
                return Ok(ApplyOutcome::AlreadyApplied);
            }
            state.check(committed)?;
        }

        if let Some(journal) = &self.journal {
            journal.append(committed).await?;
        }
        self.write()?.insert(committed.clone());

        info!(
            transition = %committed.id,
            linear_id = %committed.linear_id(),
            command = %committed.proposal.command,
            "transition applied"
        );
        Ok(ApplyOutcome::Applied)
    }

    fn read(&self) -> VaultResult<RwLockReadGuard<'_, VaultState>> {
        self.state
            .read()
            .map_err(|_| VaultError::Backend("vault lock poisoned".to_string()))
    }

    fn write(&self) -> VaultResult<RwLockWriteGuard<'_, VaultState>> {
        self.state
            .write()
            .map_err(|_| VaultError::Backend("vault lock poisoned".to_string()))
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[async_trait]
impl RecordStore for Vault {
    async fn apply(&self, committed: &CommittedTransition) -> VaultResult<ApplyOutcome> {
        let linear_id = committed.linear_id();
        let lock = self.lock_for(linear_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.apply_locked(committed).await
        };
        drop(lock);
        self.release_lock(&linear_id);
        outcome
    }

    fn current(&self, query: &RecordQuery) -> VaultResult<CurrentRecords> {
        let snapshot: Vec<RecordAndRef> = self.read()?.current.values().cloned().collect();
        Ok(CurrentRecords::new(Arc::new(snapshot), query.clone()))
    }

    fn latest(&self, linear_id: &LinearId) -> VaultResult<Option<RecordAndRef>> {
        Ok(self.read()?.current.get(linear_id).cloned())
    }

    fn transition(&self, id: &TransitionId) -> VaultResult<Option<CommittedTransition>> {
        Ok(self.read()?.transitions.get(id).cloned())
    }

    fn consumed_by(&self, reference: &RecordRef) -> VaultResult<Option<TransitionId>> {
        Ok(self.read()?.consumed.get(reference).copied())
    }
}
