//! Identity directory: resolves legal names to parties.

use std::sync::Arc;

use accord_types::Party;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("unknown party {0}")]
    UnknownParty(String),
}

/// Read-only view of the network from one party's perspective.
pub trait IdentityDirectory: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Party, DirectoryError>;

    fn self_identity(&self) -> &Party;

    /// Every known party except this one and the ordering authorities.
    fn peers(&self) -> Vec<Party>;

    /// Ordering authorities whose attestations this party accepts.
    fn authorities(&self) -> Vec<Party>;

    fn is_authority(&self, party: &Party) -> bool {
        self.authorities().iter().any(|a| a == party)
    }
}

#[derive(Debug, Clone)]
struct MapEntry {
    party: Party,
    authority: bool,
}

/// Shared registry of every party on the network.
#[derive(Debug, Default)]
pub struct NetworkMap {
    entries: DashMap<String, MapEntry>,
}

impl NetworkMap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_party(&self, party: Party) {
        self.insert(party, false);
    }

    pub fn register_authority(&self, party: Party) {
        self.insert(party, true);
    }

    fn insert(&self, party: Party, authority: bool) {
        self.entries
            .insert(party.name.clone(), MapEntry { party, authority });
    }

    fn sorted(&self, filter: impl Fn(&MapEntry) -> bool) -> Vec<Party> {
        let mut parties: Vec<Party> = self
            .entries
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().party.clone())
            .collect();
        parties.sort();
        parties
    }

    /// Directory view bound to `me`.
    pub fn directory_for(self: &Arc<Self>, me: Party) -> MapDirectory {
        MapDirectory {
            map: Arc::clone(self),
            me,
        }
    }
}

/// [`IdentityDirectory`] backed by a shared [`NetworkMap`].
#[derive(Debug, Clone)]
pub struct MapDirectory {
    map: Arc<NetworkMap>,
    me: Party,
}

impl IdentityDirectory for MapDirectory {
    fn resolve(&self, name: &str) -> Result<Party, DirectoryError> {
        self.map
            .entries
            .get(name)
            .map(|entry| entry.party.clone())
            .ok_or_else(|| DirectoryError::UnknownParty(name.to_string()))
    }

    fn self_identity(&self) -> &Party {
        &self.me
    }

    fn peers(&self) -> Vec<Party> {
        self.map.sorted(|e| !e.authority && e.party != self.me)
    }

    fn authorities(&self) -> Vec<Party> {
        self.map.sorted(|e| e.authority)
    }
}
