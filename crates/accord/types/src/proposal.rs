use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{ContentHash, Party, PartySignature, Record, RecordAndRef, TransitionId, TypesError};

/// Legal template the todo contract is bound to.
pub const CONTRACT_TEMPLATE: &[u8] = b"Todo contract template and params";

const PROPOSAL_DOMAIN: &[u8] = b"accord-proposal-v1:";

/// Hash of [`CONTRACT_TEMPLATE`], carried by every proposal.
pub fn contract_reference() -> ContentHash {
    ContentHash::hash(CONTRACT_TEMPLATE)
}

/// Mutation kind; selects the contract rules applied to a proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Create,
    Complete,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Create => write!(f, "create"),
            Command::Complete => write!(f, "complete"),
        }
    }
}

/// An unpublished candidate mutation of a single record.
///
/// The transition id is the hash of everything except `signatures`, so adding
/// a signature never changes what the other signers signed. The random `salt`
/// keeps two independently built proposals with identical content distinct.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub contract: ContentHash,
    pub command: Command,
    pub input: Option<RecordAndRef>,
    pub output: Record,
    pub salt: Uuid,
    pub signatures: Vec<PartySignature>,
}

#[derive(Serialize)]
struct CanonicalBody<'a> {
    contract: &'a ContentHash,
    command: Command,
    input: Option<&'a RecordAndRef>,
    output: &'a Record,
    salt: &'a Uuid,
}

impl Proposal {
    pub fn new(command: Command, input: Option<RecordAndRef>, output: Record) -> Self {
        Self {
            contract: contract_reference(),
            command,
            input,
            output,
            salt: Uuid::new_v4(),
            signatures: Vec::new(),
        }
    }

    /// Canonical encoding of the signed portion of the proposal.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, TypesError> {
        let body = CanonicalBody {
            contract: &self.contract,
            command: self.command,
            input: self.input.as_ref(),
            output: &self.output,
            salt: &self.salt,
        };
        serde_json::to_vec(&body).map_err(|e| TypesError::Serialization(e.to_string()))
    }

    /// Content hash identifying the transition this proposal would commit.
    pub fn id(&self) -> Result<TransitionId, TypesError> {
        Ok(ContentHash::hash_tagged(
            PROPOSAL_DOMAIN,
            &self.canonical_bytes()?,
        ))
    }

    pub fn signature_of(&self, party: &Party) -> Option<&PartySignature> {
        self.signatures.iter().find(|s| s.party == *party)
    }

    pub fn is_signed_by(&self, party: &Party) -> bool {
        self.signature_of(party).is_some()
    }

    /// Add or replace `signature.party`'s signature.
    pub fn add_signature(&mut self, signature: PartySignature) {
        self.signatures.retain(|s| s.party != signature.party);
        self.signatures.push(signature);
        self.signatures.sort_by(|a, b| a.party.cmp(&b.party));
    }

    pub fn signers(&self) -> impl Iterator<Item = &Party> {
        self.signatures.iter().map(|s| &s.party)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PublicKey, RecordRef, Signature, TodoItem};

    fn party(name: &str, seed: u8) -> Party {
        Party::new(name, PublicKey([seed; 32]))
    }

    fn create_proposal() -> Proposal {
        let output = Record::create(TodoItem::new("buy milk", "d"), party("A", 1), party("B", 2));
        Proposal::new(Command::Create, None, output)
    }

    #[test]
    fn new_proposal_carries_contract_reference() {
        let proposal = create_proposal();
        assert_eq!(proposal.contract, contract_reference());
        assert!(proposal.signatures.is_empty());
    }

    #[test]
    fn id_is_stable_and_ignores_signatures() {
        let mut proposal = create_proposal();
        let before = proposal.id().unwrap();
        proposal.add_signature(PartySignature {
            party: party("A", 1),
            signature: Signature([9; 64]),
        });
        assert_eq!(proposal.id().unwrap(), before);
    }

    #[test]
    fn identical_content_built_twice_gets_distinct_ids() {
        let first = create_proposal();
        let second = Proposal::new(Command::Create, None, first.output.clone());
        assert_ne!(first.id().unwrap(), second.id().unwrap());
    }

    #[test]
    fn id_changes_with_output() {
        let proposal = create_proposal();
        let mut tampered = proposal.clone();
        tampered.output.payload.title = "buy bread".into();
        assert_ne!(proposal.id().unwrap(), tampered.id().unwrap());
    }

    #[test]
    fn id_changes_with_input_reference() {
        let first = create_proposal();
        let input = RecordAndRef {
            record: first.output.clone(),
            reference: RecordRef {
                linear_id: first.output.linear_id,
                produced_by: first.id().unwrap(),
            },
        };
        let output = first.output.derive(first.output.payload.completed());
        let a = Proposal::new(Command::Complete, Some(input.clone()), output.clone());

        let mut other_input = input;
        other_input.reference.produced_by = ContentHash::hash(b"elsewhere");
        let b = Proposal::new(Command::Complete, Some(other_input), output);
        assert_ne!(a.id().unwrap(), b.id().unwrap());
    }

    #[test]
    fn add_signature_replaces_existing_entry() {
        let mut proposal = create_proposal();
        proposal.add_signature(PartySignature {
            party: party("A", 1),
            signature: Signature([1; 64]),
        });
        proposal.add_signature(PartySignature {
            party: party("A", 1),
            signature: Signature([2; 64]),
        });
        assert_eq!(proposal.signatures.len(), 1);
        assert_eq!(
            proposal.signature_of(&party("A", 1)).unwrap().signature,
            Signature([2; 64])
        );
        assert!(!proposal.is_signed_by(&party("B", 2)));
    }
}
