use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::{LinearId, Party, TransitionId};

/// Business payload of a record version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub title: String,
    pub description: String,
    pub complete: bool,
}

impl TodoItem {
    /// A fresh, incomplete item.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            complete: false,
        }
    }

    /// Same item with only the completion flag set.
    pub fn completed(&self) -> Self {
        Self {
            complete: true,
            ..self.clone()
        }
    }
}

/// One version of a linear record.
///
/// `linear_id`, `owner` and `assignee` are carried unchanged into every later
/// version; only the payload changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub linear_id: LinearId,
    pub payload: TodoItem,
    pub owner: Party,
    pub assignee: Party,
}

impl Record {
    /// First version of a new record with a freshly assigned `linear_id`.
    pub fn create(payload: TodoItem, owner: Party, assignee: Party) -> Self {
        Self {
            linear_id: LinearId::new(),
            payload,
            owner,
            assignee,
        }
    }

    /// Next version of this record carrying `payload`.
    pub fn derive(&self, payload: TodoItem) -> Self {
        Self {
            linear_id: self.linear_id,
            payload,
            owner: self.owner.clone(),
            assignee: self.assignee.clone(),
        }
    }

    /// Parties that must authorize any mutation and receive the result.
    pub fn participants(&self) -> BTreeSet<Party> {
        [self.owner.clone(), self.assignee.clone()]
            .into_iter()
            .collect()
    }

    pub fn is_relevant(&self, party: &Party) -> bool {
        self.owner == *party || self.assignee == *party
    }

    pub fn is_complete(&self) -> bool {
        self.payload.complete
    }
}

/// Points at one exact version of a record: the transition that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    pub linear_id: LinearId,
    pub produced_by: TransitionId,
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.linear_id, self.produced_by)
    }
}

/// A record version paired with the reference that locates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAndRef {
    pub record: Record,
    pub reference: RecordRef,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PublicKey;

    fn party(name: &str, seed: u8) -> Party {
        Party::new(name, PublicKey([seed; 32]))
    }

    #[test]
    fn create_assigns_fresh_linear_ids() {
        let item = TodoItem::new("buy milk", "2 litres");
        let a = Record::create(item.clone(), party("A", 1), party("B", 2));
        let b = Record::create(item, party("A", 1), party("B", 2));
        assert_ne!(a.linear_id, b.linear_id);
        assert!(!a.is_complete());
    }

    #[test]
    fn derive_preserves_identity_fields() {
        let first = Record::create(TodoItem::new("t", "d"), party("A", 1), party("B", 2));
        let next = first.derive(first.payload.completed());
        assert_eq!(next.linear_id, first.linear_id);
        assert_eq!(next.owner, first.owner);
        assert_eq!(next.assignee, first.assignee);
        assert!(next.is_complete());
        assert_eq!(next.payload.title, "t");
    }

    #[test]
    fn participants_are_owner_and_assignee() {
        let record = Record::create(TodoItem::new("t", "d"), party("A", 1), party("B", 2));
        let participants = record.participants();
        assert_eq!(participants.len(), 2);
        assert!(record.is_relevant(&party("A", 1)));
        assert!(record.is_relevant(&party("B", 2)));
        assert!(!record.is_relevant(&party("C", 3)));
    }

    #[test]
    fn self_assigned_record_has_single_participant() {
        let record = Record::create(TodoItem::new("t", "d"), party("A", 1), party("A", 1));
        assert_eq!(record.participants().len(), 1);
    }
}
