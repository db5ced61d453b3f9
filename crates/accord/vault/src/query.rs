use std::sync::Arc;

use accord_types::{LinearId, Party, Record, RecordAndRef};
use serde::{Deserialize, Serialize};

/// Conjunctive predicate over current record versions.
///
/// Unset fields match everything, so `RecordQuery::default()` selects all
/// current records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordQuery {
    pub linear_id: Option<LinearId>,
    pub owner: Option<Party>,
    pub assignee: Option<Party>,
    pub participant: Option<Party>,
    pub complete: Option<bool>,
}

impl RecordQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn linear_id(mut self, id: LinearId) -> Self {
        self.linear_id = Some(id);
        self
    }

    pub fn owner(mut self, party: Party) -> Self {
        self.owner = Some(party);
        self
    }

    pub fn assignee(mut self, party: Party) -> Self {
        self.assignee = Some(party);
        self
    }

    pub fn participant(mut self, party: Party) -> Self {
        self.participant = Some(party);
        self
    }

    pub fn complete(mut self, complete: bool) -> Self {
        self.complete = Some(complete);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if self.linear_id.is_some_and(|id| id != record.linear_id) {
            return false;
        }
        if self.owner.as_ref().is_some_and(|p| *p != record.owner) {
            return false;
        }
        if self.assignee.as_ref().is_some_and(|p| *p != record.assignee) {
            return false;
        }
        if self
            .participant
            .as_ref()
            .is_some_and(|p| !record.is_relevant(p))
        {
            return false;
        }
        if self.complete.is_some_and(|c| c != record.payload.complete) {
            return false;
        }
        true
    }
}

/// Lazy, finite, restartable view of the current records matching a query.
///
/// Holds a snapshot taken when the query ran; every call to [`Self::iter`]
/// starts a fresh pass that filters the snapshot on demand.
#[derive(Clone, Debug)]
pub struct CurrentRecords {
    snapshot: Arc<Vec<RecordAndRef>>,
    query: RecordQuery,
}

impl CurrentRecords {
    pub(crate) fn new(snapshot: Arc<Vec<RecordAndRef>>, query: RecordQuery) -> Self {
        Self { snapshot, query }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordAndRef> + '_ {
        self.snapshot
            .iter()
            .filter(move |entry| self.query.matches(&entry.record))
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.iter().map(|entry| &entry.record)
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn to_vec(&self) -> Vec<RecordAndRef> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a CurrentRecords {
    type Item = &'a RecordAndRef;
    type IntoIter = Box<dyn Iterator<Item = &'a RecordAndRef> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
